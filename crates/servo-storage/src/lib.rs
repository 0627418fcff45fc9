//! # Servo Storage
//!
//! Persistence layer for the servo item store: client sessions and the items
//! each client owns.
//!
//! ## Data Model
//!
//! ```text
//! session (client PK, expire_on)          item ((client, key) PK)
//! ┌──────────────┬────────────┐           ┌────────┬─────┬──────────────┬────────────┬────────────┐
//! │ client       │ expire_on  │ 1 ─── n   │ client │ key │ string_value │ json_value │ blob_value │
//! └──────────────┴────────────┘           └────────┴─────┴──────────────┴────────────┴────────────┘
//!                                          exactly one value column is non-null
//! ```
//!
//! ## Invariants
//!
//! | Invariant | Enforcement |
//! |-----------|-------------|
//! | At most one session row per client | primary key on `session.client` |
//! | Expired sessions are replaced, never updated in place | `StoreConnection::renew_session` |
//! | An item holds exactly one of string / json / blob | CHECK constraint + `ItemValue::from_columns` |
//! | Zero rows means "does not exist" | `QueryResult::Rows(vec![])` |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Session and item entities, storage operations, errors
//! - `ports/` - The `Store` / `StoreConnection` driven ports and `TimeSource`
//! - `adapters/` - SQLite (sqlx) and in-memory implementations
//!
//! ## Usage
//!
//! ```ignore
//! use servo_storage::{Operation, SqliteConfig, SqliteStore, Store};
//!
//! let store = SqliteStore::open(&SqliteConfig::default()).await?;
//! store.ensure_schema().await?;
//!
//! let mut conn = store.connect().await?;
//! let result = conn
//!     .execute(Operation::QuerySession { client: "abc".into() })
//!     .await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use adapters::sqlite::{SqliteConfig, SqliteStore};
pub use domain::entities::{ItemValue, Session, Timestamp};
pub use domain::errors::StorageError;
pub use domain::operations::{Operation, QueryResult, Row};
pub use ports::outbound::{ManualTimeSource, Store, StoreConnection, SystemTimeSource, TimeSource};
