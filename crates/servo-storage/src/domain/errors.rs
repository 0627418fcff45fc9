//! # Domain Errors
//!
//! Storage failures as the request pipeline needs to see them. Adapters
//! translate driver errors into these variants once; callers never inspect
//! driver text.

/// Errors produced by a `Store` or `StoreConnection`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The backend cannot hand out a connection right now. Retryable.
    #[error("storage not ready: {message}")]
    NotReady { message: String },

    /// A primary key or unique constraint rejected the write.
    #[error("unique constraint violated: {message}")]
    UniqueViolation { message: String },

    /// A row does not satisfy the item/session shape.
    #[error("malformed row: {message}")]
    MalformedRow { message: String },

    /// Any other backend failure.
    #[error("database error: {message}")]
    Database { message: String },
}

impl StorageError {
    /// Classify a driver message that carries no structured error code.
    ///
    /// Compatibility shim: drivers that only expose text are matched against
    /// the duplicate-key wording of SQLite and PostgreSQL.
    pub fn from_driver_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_duplicate_key_message(&message) {
            StorageError::UniqueViolation { message }
        } else {
            StorageError::Database { message }
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StorageError::UniqueViolation { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::NotReady { .. })
    }
}

/// Duplicate-key wording of the supported drivers.
pub fn is_duplicate_key_message(message: &str) -> bool {
    message.contains("UNIQUE constraint failed") || message.contains("duplicate key")
}
