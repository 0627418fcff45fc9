//! Gateway error types.
//!
//! Every failure surfaced to a client is an `ApiError`: an HTTP status, a
//! human readable message and optional structured fields, serialized as
//! `{"code": <status>, "message": "...", ...fields}`.

use axum::http::StatusCode;
use serde::Serialize;
use servo_storage::StorageError;
use std::fmt;

/// Failure taxonomy of the request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Origin / address / representation policy refused the request
    PolicyDenied,
    /// Malformed or oversized input
    ValidationFailed,
    /// Item does not exist
    NotFound,
    /// Uniqueness violation in storage
    Conflict,
    /// Any other storage failure
    StorageFailure,
    /// Broken internal invariant
    InternalFailure,
    /// A bounded wait elapsed
    Timeout,
}

impl ErrorKind {
    /// Default status for the kind
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::PolicyDenied => StatusCode::FORBIDDEN,
            ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::StorageFailure | ErrorKind::InternalFailure => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Classify a storage failure. Only uniqueness violations are the
    /// client's concern.
    pub fn from_storage(err: &StorageError) -> Self {
        if err.is_unique_violation() {
            ErrorKind::Conflict
        } else {
            ErrorKind::StorageFailure
        }
    }
}

/// Client-facing error
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Error message
    pub message: String,
    /// Optional structured fields merged into the body
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
        }
    }

    /// Create an error whose message is the status reason phrase
    pub fn from_status(status: StatusCode) -> Self {
        Self::new(status, reason_phrase(status))
    }

    /// Attach structured fields
    pub fn with_data(mut self, data: serde_json::Map<String, serde_json::Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind.status(), message)
    }

    pub fn policy_denied(message: impl Into<String>) -> Self {
        Self::kind(ErrorKind::PolicyDenied, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::kind(ErrorKind::ValidationFailed, message)
    }

    /// Size limit exceeded: a validation failure reported as 403
    pub fn too_large() -> Self {
        Self::new(StatusCode::FORBIDDEN, "Request is too large")
    }

    pub fn not_found() -> Self {
        Self::from_status(StatusCode::NOT_FOUND)
    }

    pub fn internal() -> Self {
        Self::from_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::kind(ErrorKind::Timeout, message)
    }

    /// JSON parse failure with line/column/position fields
    pub fn json_syntax(err: &serde_json::Error, body: &[u8]) -> Self {
        let line = err.line();
        let column = err.column();
        let position = byte_position(body, line, column);
        let text = err.to_string();
        // serde_json appends its own " at line L column C"
        let text = match text.rfind(" at line ") {
            Some(idx) => text[..idx].to_string(),
            None => text,
        };

        let mut data = serde_json::Map::new();
        data.insert("line".into(), line.into());
        data.insert("column".into(), column.into());
        data.insert("position".into(), position.into());
        Self::bad_request(format!(
            "{} at line: {}, column: {}, pos: {}",
            text, line, column, position
        ))
        .with_data(data)
    }
}

/// Offset of `(line, column)` in `body`; both are 1-based as reported by
/// serde_json. Column 0 means "before the first character of the line".
fn byte_position(body: &[u8], line: usize, column: usize) -> usize {
    let line_start: usize = body
        .split(|b| *b == b'\n')
        .take(line.saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum();
    (line_start + column).min(body.len())
}

/// Canonical reason phrase, falling back to the numeric code
pub fn reason_phrase(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_u16().to_string())
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl Serialize for ApiError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let extra = self.data.as_ref().map_or(0, |d| d.len());
        let mut state = serializer.serialize_map(Some(2 + extra))?;
        state.serialize_entry("code", &self.status.as_u16())?;
        state.serialize_entry("message", &self.message)?;
        if let Some(ref data) = self.data {
            for (key, value) in data {
                if key != "code" && key != "message" {
                    state.serialize_entry(key, value)?;
                }
            }
        }
        state.end()
    }
}

/// Gateway-level errors (startup and lifecycle, not client facing)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// Server already running
    #[error("service already started")]
    AlreadyStarted,

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}
