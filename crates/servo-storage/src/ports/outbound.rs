//! # Outbound Ports (Driven Ports)
//!
//! The storage backend as seen by the request pipeline.
//!
//! Production: `SqliteStore` (adapters/sqlite.rs)
//! Testing: `InMemoryStore` (adapters/memory.rs)

use crate::domain::entities::{Session, Timestamp};
use crate::domain::errors::StorageError;
use crate::domain::operations::{Operation, QueryResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};

/// A pool of backend connections.
#[async_trait]
pub trait Store: Send + Sync {
    /// Check out a connection.
    ///
    /// `StorageError::NotReady` means "try again later" and is the only
    /// retryable failure.
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StorageError>;
}

/// An exclusively owned connection. Dropping it returns it to the pool.
#[async_trait]
pub trait StoreConnection: Send {
    /// Execute one operation to completion.
    async fn execute(&mut self, op: Operation) -> Result<QueryResult, StorageError>;

    /// Replace the session row for `session.client`.
    ///
    /// Expired rows are purged and re-inserted, never updated in place.
    /// Adapters with transactions override this to make both steps atomic.
    async fn renew_session(&mut self, session: &Session) -> Result<(), StorageError> {
        self.execute(Operation::PurgeSession {
            client: session.client.clone(),
        })
        .await?;
        self.execute(Operation::PutSession(session.clone())).await?;
        Ok(())
    }
}

/// Abstract interface for time operations (for testability).
pub trait TimeSource: Send + Sync {
    /// Current timestamp in seconds since epoch.
    fn now(&self) -> Timestamp;
}

/// Default time source using system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as Timestamp)
            .unwrap_or(0)
    }
}

/// Settable clock for tests.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: AtomicI64,
}

impl ManualTimeSource {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
