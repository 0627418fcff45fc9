//! In-memory store.
//!
//! Enforces the same keys as the SQL schema (unique session per client,
//! unique item per `(client, key)`) so conflict paths behave like SQLite.
//! Failure injection hooks let tests drive the retry, error and timeout
//! paths of the request pipeline.

use crate::domain::entities::{ItemValue, Session, Timestamp};
use crate::domain::errors::StorageError;
use crate::domain::operations::{Operation, QueryResult, Row};
use crate::ports::outbound::{Store, StoreConnection};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct Tables {
    sessions: HashMap<String, Timestamp>,
    items: HashMap<(String, String), ItemValue>,
}

#[derive(Debug, Default)]
struct Faults {
    unavailable_connects: AtomicU32,
    failing_queries: AtomicU32,
    query_delay: Mutex<Option<Duration>>,
}

/// Shared in-memory store. Clones observe the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` calls to `connect` report `NotReady`.
    pub fn fail_next_connects(&self, n: u32) {
        self.faults.unavailable_connects.store(n, Ordering::SeqCst);
    }

    /// The next `n` executed operations fail with a database error.
    pub fn fail_next_queries(&self, n: u32) {
        self.faults.failing_queries.store(n, Ordering::SeqCst);
    }

    /// Every operation sleeps for `delay` before running.
    pub fn set_query_delay(&self, delay: Option<Duration>) {
        *self.faults.query_delay.lock() = delay;
    }

    pub fn insert_session(&self, session: Session) {
        self.tables
            .lock()
            .sessions
            .insert(session.client, session.expire_on);
    }

    pub fn session(&self, client: &str) -> Option<Session> {
        self.tables
            .lock()
            .sessions
            .get(client)
            .map(|expire_on| Session::new(client, *expire_on))
    }

    pub fn session_count(&self) -> usize {
        self.tables.lock().sessions.len()
    }

    pub fn item(&self, client: &str, key: &str) -> Option<ItemValue> {
        self.tables
            .lock()
            .items
            .get(&(client.to_string(), key.to_string()))
            .cloned()
    }

    pub fn item_count(&self) -> usize {
        self.tables.lock().items.len()
    }
}

/// Decrement `counter` if positive; true when a fault should fire.
fn take_fault(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Store for InMemoryStore {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StorageError> {
        if take_fault(&self.faults.unavailable_connects) {
            return Err(StorageError::NotReady {
                message: "in-memory store is unavailable".into(),
            });
        }
        Ok(Box::new(MemoryConnection {
            tables: Arc::clone(&self.tables),
            faults: Arc::clone(&self.faults),
        }))
    }
}

struct MemoryConnection {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl MemoryConnection {
    fn apply(&self, op: Operation) -> Result<QueryResult, StorageError> {
        let mut tables = self.tables.lock();
        let result = match op {
            Operation::QuerySession { client } => QueryResult::Rows(
                tables
                    .sessions
                    .get(&client)
                    .map(|expire_on| Row::Session(Session::new(client.clone(), *expire_on)))
                    .into_iter()
                    .collect(),
            ),
            Operation::PutSession(session) => {
                if tables.sessions.contains_key(&session.client) {
                    return Err(StorageError::UniqueViolation {
                        message: format!("session {} already exists", session.client),
                    });
                }
                tables.sessions.insert(session.client, session.expire_on);
                QueryResult::Complete { rows_affected: 1 }
            }
            Operation::PurgeSession { client } => QueryResult::Complete {
                rows_affected: u64::from(tables.sessions.remove(&client).is_some()),
            },
            Operation::GetItem { client, key } => QueryResult::Rows(
                tables
                    .items
                    .get(&(client, key))
                    .map(|value| Row::Item(value.clone()))
                    .into_iter()
                    .collect(),
            ),
            Operation::PostItem { client, key, value } => {
                let id = (client, key);
                if tables.items.contains_key(&id) {
                    return Err(StorageError::UniqueViolation {
                        message: format!("item {}/{} already exists", id.0, id.1),
                    });
                }
                tables.items.insert(id, value);
                QueryResult::Complete { rows_affected: 1 }
            }
            Operation::PutItem { client, key, value } => {
                tables.items.insert((client, key), value);
                QueryResult::Complete { rows_affected: 1 }
            }
            Operation::DeleteItem { client, key } => QueryResult::Complete {
                rows_affected: u64::from(tables.items.remove(&(client, key)).is_some()),
            },
        };
        Ok(result)
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn execute(&mut self, op: Operation) -> Result<QueryResult, StorageError> {
        let delay = *self.faults.query_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if take_fault(&self.faults.failing_queries) {
            return Err(StorageError::Database {
                message: format!("injected failure for {}", op.role()),
            });
        }
        self.apply(op)
    }

    async fn renew_session(&mut self, session: &Session) -> Result<(), StorageError> {
        // Single lock acquisition: purge and insert are observed together.
        self.tables
            .lock()
            .sessions
            .insert(session.client.clone(), session.expire_on);
        Ok(())
    }
}
