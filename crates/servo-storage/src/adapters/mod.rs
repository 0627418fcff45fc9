//! # Adapters Module
//!
//! - `memory`: in-process store for tests and development
//! - `queries`: SQL text for every persisted operation, by role
//! - `sqlite`: sqlx-backed SQLite store

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod queries;
#[cfg(feature = "sqlite")]
pub mod sqlite;
