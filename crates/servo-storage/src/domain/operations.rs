//! # Storage Operations
//!
//! Every persisted operation, identified by its role. A `StoreConnection`
//! executes one operation at a time.

use super::entities::{ItemValue, Session};

/// A persisted operation with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// `query-session(client)`: zero or one session row.
    QuerySession { client: String },
    /// `put-session(client, expire_on)`: plain insert.
    PutSession(Session),
    /// `purge-session(client)`.
    PurgeSession { client: String },
    /// `get-item(client, key)`: zero or one item row.
    GetItem { client: String, key: String },
    /// `post-item(client, key, value)`: plain insert, duplicate key fails.
    PostItem {
        client: String,
        key: String,
        value: ItemValue,
    },
    /// `put-item(client, key, value)`: insert or replace.
    PutItem {
        client: String,
        key: String,
        value: ItemValue,
    },
    /// `delete-item(client, key)`.
    DeleteItem { client: String, key: String },
}

impl Operation {
    /// Role name used in logs.
    pub fn role(&self) -> &'static str {
        match self {
            Operation::QuerySession { .. } => "query-session",
            Operation::PutSession(_) => "put-session",
            Operation::PurgeSession { .. } => "purge-session",
            Operation::GetItem { .. } => "get-item",
            Operation::PostItem { .. } => "post-item",
            Operation::PutItem { .. } => "put-item",
            Operation::DeleteItem { .. } => "delete-item",
        }
    }
}

/// A single row returned by a query operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Session(Session),
    Item(ItemValue),
}

/// Outcome of `StoreConnection::execute`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Rows of a query (possibly none).
    Rows(Vec<Row>),
    /// A write finished.
    Complete { rows_affected: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles() {
        let op = Operation::GetItem {
            client: "c".into(),
            key: "k".into(),
        };
        assert_eq!(op.role(), "get-item");

        let op = Operation::PutSession(Session::new("c", 10));
        assert_eq!(op.role(), "put-session");
    }
}
