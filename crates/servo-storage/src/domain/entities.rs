//! # Domain Entities
//!
//! Session records and item values.

use super::errors::StorageError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unix timestamp in seconds since epoch.
pub type Timestamp = i64;

/// Durable association between a client id and its expiry time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Client identifier (primary key).
    pub client: String,
    /// Expiry in unix seconds.
    pub expire_on: Timestamp,
}

impl Session {
    pub fn new(client: impl Into<String>, expire_on: Timestamp) -> Self {
        Self {
            client: client.into(),
            expire_on,
        }
    }

    /// A fresh session for `client` that expires `ttl` after `now`.
    pub fn starting_at(client: impl Into<String>, now: Timestamp, ttl: Duration) -> Self {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        Self::new(client, now.saturating_add(ttl_secs))
    }

    /// A session whose expiry is at or before `now` is expired.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expire_on <= now
    }
}

/// A stored item value. Exactly one representation per item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemValue {
    String(String),
    Json(serde_json::Value),
    Blob(Vec<u8>),
}

impl ItemValue {
    /// Build a value from the three nullable storage columns.
    ///
    /// Fails unless exactly one column is populated.
    pub fn from_columns(
        string: Option<String>,
        json: Option<String>,
        blob: Option<Vec<u8>>,
    ) -> Result<Self, StorageError> {
        match (string, json, blob) {
            (Some(s), None, None) => Ok(ItemValue::String(s)),
            (None, Some(j), None) => serde_json::from_str(&j)
                .map(ItemValue::Json)
                .map_err(|e| StorageError::MalformedRow {
                    message: format!("json_value does not parse: {}", e),
                }),
            (None, None, Some(b)) => Ok(ItemValue::Blob(b)),
            (None, None, None) => Err(StorageError::MalformedRow {
                message: "no value column is populated".into(),
            }),
            _ => Err(StorageError::MalformedRow {
                message: "more than one value column is populated".into(),
            }),
        }
    }

    /// Split into `(string, json, blob)` column parameters; exactly one is `Some`.
    pub fn to_columns(&self) -> (Option<&str>, Option<String>, Option<&[u8]>) {
        match self {
            ItemValue::String(s) => (Some(s.as_str()), None, None),
            ItemValue::Json(v) => (None, Some(v.to_string()), None),
            ItemValue::Blob(b) => (None, None, Some(b.as_slice())),
        }
    }

    /// Size of the stored representation in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            ItemValue::String(s) => s.len(),
            ItemValue::Json(v) => v.to_string().len(),
            ItemValue::Blob(b) => b.len(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ItemValue::String(_) => "string",
            ItemValue::Json(_) => "json",
            ItemValue::Blob(_) => "blob",
        }
    }
}
