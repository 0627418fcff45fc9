//! SQLite store over a sqlx connection pool.

use super::queries;
use crate::domain::entities::{ItemValue, Session};
use crate::domain::errors::StorageError;
use crate::domain::operations::{Operation, QueryResult, Row};
use crate::ports::outbound::{Store, StoreConnection};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Connection as _;
use sqlx::Sqlite;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// SQLite pool settings.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database URL, e.g. `sqlite://servo.db`.
    pub url: String,
    /// Pool size.
    pub max_connections: u32,
    /// How long `connect` waits for a free pooled connection before
    /// reporting `NotReady`.
    pub acquire_timeout: Duration,
    /// SQLite busy handler timeout.
    pub busy_timeout: Duration,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://servo.db".to_string(),
            max_connections: 8,
            acquire_timeout: Duration::from_secs(1),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StorageError::UniqueViolation {
                    message: db_err.message().to_string(),
                }
            }
            sqlx::Error::Database(db_err) => StorageError::from_driver_message(db_err.message()),
            sqlx::Error::PoolTimedOut => StorageError::NotReady {
                message: "timed out waiting for a pooled connection".into(),
            },
            sqlx::Error::PoolClosed => StorageError::NotReady {
                message: "connection pool is closed".into(),
            },
            sqlx::Error::Io(e) => StorageError::NotReady {
                message: e.to_string(),
            },
            other => StorageError::Database {
                message: other.to_string(),
            },
        }
    }
}

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the pool. The database file is created if missing.
    pub async fn open(config: &SqliteConfig) -> Result<Self, StorageError> {
        let opts = SqliteConnectOptions::from_str(&config.url)
            .map_err(StorageError::from)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(opts)
            .await?;

        debug!(url = %config.url, max_connections = config.max_connections, "SQLite pool opened");
        Ok(Self { pool })
    }

    /// Open the pool, retrying up to `attempts` times with `attempt_wait`
    /// between failures.
    pub async fn open_with_retry(
        config: &SqliteConfig,
        attempts: u32,
        attempt_wait: Duration,
    ) -> Result<Self, StorageError> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match Self::open(config).await {
                Ok(store) => return Ok(store),
                Err(e) if attempt < attempts => {
                    warn!(
                        attempt,
                        attempts,
                        wait_ms = attempt_wait.as_millis() as u64,
                        error = %e,
                        "Database connection failed, retrying"
                    );
                    tokio::time::sleep(attempt_wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Make sure the schema exists and return the current item count.
    ///
    /// The item count doubles as the schema probe: when it fails the
    /// schema is created.
    pub async fn ensure_schema(&self) -> Result<i64, StorageError> {
        match self.count_items().await {
            Ok(count) => {
                info!(items = count, "Database ready");
                Ok(count)
            }
            Err(e) => {
                info!(reason = %e, "Initializing database schema");
                self.init_schema().await?;
                self.count_items().await
            }
        }
    }

    /// Run the `init` role.
    pub async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query(queries::INIT).execute(&self.pool).await?;
        Ok(())
    }

    /// Run the `count-items` role.
    pub async fn count_items(&self) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar(queries::COUNT_ITEMS)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Close the pool, waiting for checked-out connections to come back.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StorageError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(SqliteConnection { conn }))
    }
}

struct SqliteConnection {
    conn: PoolConnection<Sqlite>,
}

type ItemColumns = (Option<String>, Option<String>, Option<Vec<u8>>);

#[async_trait]
impl StoreConnection for SqliteConnection {
    async fn execute(&mut self, op: Operation) -> Result<QueryResult, StorageError> {
        let result = match op {
            Operation::QuerySession { client } => {
                let rows: Vec<(String, i64)> = sqlx::query_as(queries::QUERY_SESSION)
                    .bind(&client)
                    .fetch_all(&mut *self.conn)
                    .await?;
                QueryResult::Rows(
                    rows.into_iter()
                        .map(|(client, expire_on)| Row::Session(Session::new(client, expire_on)))
                        .collect(),
                )
            }
            Operation::PutSession(session) => {
                let done = sqlx::query(queries::PUT_SESSION)
                    .bind(&session.client)
                    .bind(session.expire_on)
                    .execute(&mut *self.conn)
                    .await?;
                QueryResult::Complete {
                    rows_affected: done.rows_affected(),
                }
            }
            Operation::PurgeSession { client } => {
                let done = sqlx::query(queries::PURGE_SESSION)
                    .bind(&client)
                    .execute(&mut *self.conn)
                    .await?;
                QueryResult::Complete {
                    rows_affected: done.rows_affected(),
                }
            }
            Operation::GetItem { client, key } => {
                let rows: Vec<ItemColumns> = sqlx::query_as(queries::GET_ITEM)
                    .bind(&client)
                    .bind(&key)
                    .fetch_all(&mut *self.conn)
                    .await?;
                let items = rows
                    .into_iter()
                    .map(|(s, j, b)| ItemValue::from_columns(s, j, b).map(Row::Item))
                    .collect::<Result<Vec<_>, _>>()?;
                QueryResult::Rows(items)
            }
            Operation::PostItem { client, key, value } => {
                self.write_item(queries::POST_ITEM, &client, &key, &value)
                    .await?
            }
            Operation::PutItem { client, key, value } => {
                self.write_item(queries::PUT_ITEM, &client, &key, &value)
                    .await?
            }
            Operation::DeleteItem { client, key } => {
                let done = sqlx::query(queries::DELETE_ITEM)
                    .bind(&client)
                    .bind(&key)
                    .execute(&mut *self.conn)
                    .await?;
                QueryResult::Complete {
                    rows_affected: done.rows_affected(),
                }
            }
        };
        Ok(result)
    }

    async fn renew_session(&mut self, session: &Session) -> Result<(), StorageError> {
        let mut tx = self.conn.begin().await?;
        sqlx::query(queries::PURGE_SESSION)
            .bind(&session.client)
            .execute(&mut *tx)
            .await?;
        sqlx::query(queries::PUT_SESSION)
            .bind(&session.client)
            .bind(session.expire_on)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

impl SqliteConnection {
    async fn write_item(
        &mut self,
        sql: &'static str,
        client: &str,
        key: &str,
        value: &ItemValue,
    ) -> Result<QueryResult, StorageError> {
        let (string, json, blob) = value.to_columns();
        let done = sqlx::query(sql)
            .bind(client)
            .bind(key)
            .bind(string)
            .bind(json)
            .bind(blob)
            .execute(&mut *self.conn)
            .await?;
        Ok(QueryResult::Complete {
            rows_affected: done.rows_affected(),
        })
    }
}
