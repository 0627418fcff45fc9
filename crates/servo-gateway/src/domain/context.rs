//! Per-request state threaded through the pipeline phases.

use super::content::ContentClass;
use super::error::{reason_phrase, ApiError, ErrorKind};
use axum::body::Body;
use axum::http::{Extensions, HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use futures::future::BoxFuture;
use servo_storage::{ItemValue, QueryResult, Row, Session, StorageError, StoreConnection};
use std::fmt;
use tokio::time::Instant;

/// Protocol state of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    SessionConnect,
    SessionQuery,
    SessionWait,
    SessionRead,
    SessionReady,
    ItemConnect,
    ItemQuery,
    ItemWait,
    ItemRead,
    Done,
    Error,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Error)
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::SessionConnect => "session-connect",
            Phase::SessionQuery => "session-query",
            Phase::SessionWait => "session-wait",
            Phase::SessionRead => "session-read",
            Phase::SessionReady => "session-ready",
            Phase::ItemConnect => "item-connect",
            Phase::ItemQuery => "item-query",
            Phase::ItemWait => "item-wait",
            Phase::ItemRead => "item-read",
            Phase::Done => "done",
            Phase::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An operation running on an owned connection. Resolves to the connection
/// and the operation result.
pub type InFlight =
    BoxFuture<'static, (Box<dyn StoreConnection>, Result<QueryResult, StorageError>)>;

/// Exclusively owned storage handle of a request.
///
/// Dropping it cancels any in-flight operation and returns the connection
/// to its pool.
#[derive(Default)]
pub enum DbHandle {
    /// No connection held
    #[default]
    Idle,
    /// Connection checked out, nothing issued yet
    Connected(Box<dyn StoreConnection>),
    /// Operation in flight
    InFlight(InFlight),
    /// Query finished, rows not yet consumed
    Ready {
        conn: Box<dyn StoreConnection>,
        rows: Vec<Row>,
    },
    /// Result consumed, connection still held
    Drained(Box<dyn StoreConnection>),
}

impl DbHandle {
    /// Release everything.
    pub fn reset(&mut self) {
        *self = DbHandle::Idle;
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, DbHandle::Idle)
    }

    /// Take the pending rows; the handle moves to `Drained`.
    pub fn take_rows(&mut self) -> Option<Vec<Row>> {
        match std::mem::take(self) {
            DbHandle::Ready { conn, rows } => {
                *self = DbHandle::Drained(conn);
                Some(rows)
            }
            other => {
                *self = other;
                None
            }
        }
    }

    /// Take the connection for issuing a new operation.
    pub fn take_connection(&mut self) -> Option<Box<dyn StoreConnection>> {
        match std::mem::take(self) {
            DbHandle::Connected(conn) | DbHandle::Drained(conn) => Some(conn),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Borrow the held connection between operations.
    pub fn connection_mut(&mut self) -> Option<&mut Box<dyn StoreConnection>> {
        match self {
            DbHandle::Connected(conn) | DbHandle::Drained(conn) | DbHandle::Ready { conn, .. } => {
                Some(conn)
            }
            _ => None,
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            DbHandle::Idle => "idle",
            DbHandle::Connected(_) => "connected",
            DbHandle::InFlight(_) => "in-flight",
            DbHandle::Ready { .. } => "ready",
            DbHandle::Drained(_) => "drained",
        }
    }
}

impl fmt::Debug for DbHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DbHandle").field(&self.state_name()).finish()
    }
}

/// State of one in-flight request, owned by its task.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    /// Request path after the leading `/`; empty for the store root
    pub key: String,
    pub headers: HeaderMap,
    /// Request extensions, carried into the multipart extractor
    pub extensions: Extensions,
    /// Request body, consumed by the item query
    pub body: Option<Body>,

    pub status: StatusCode,
    error: Option<ApiError>,
    /// Driver text of a storage failure (logged, never returned)
    pub driver_error: Option<String>,

    client_id: Option<String>,
    pub session: Option<Session>,

    pub in_content: ContentClass,
    pub out_content: Option<ContentClass>,
    pub value: Option<ItemValue>,

    pub db: DbHandle,
    pub phase: Phase,
    /// Start of the current connect cycle, for the retry bound
    pub connect_started: Option<Instant>,

    /// Headers attached to whatever response is produced
    pub response_headers: HeaderMap,
    /// Response produced before `Done` (stats, console)
    pub rendered: Option<Response>,
}

impl RequestContext {
    pub fn new(req: Request<Body>) -> Self {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path();
        let key = path.strip_prefix('/').unwrap_or(path).to_string();
        let in_content = ContentClass::from_content_type(&parts.headers);
        let out_content = ContentClass::from_accept(&parts.headers);

        Self {
            method: parts.method,
            key,
            headers: parts.headers,
            extensions: parts.extensions,
            body: Some(body),
            status: StatusCode::OK,
            error: None,
            driver_error: None,
            client_id: None,
            session: None,
            in_content,
            out_content,
            value: None,
            db: DbHandle::Idle,
            phase: Phase::Init,
            connect_started: None,
            response_headers: HeaderMap::new(),
            rendered: None,
        }
    }

    /// Item requests carry a non-empty key.
    pub fn is_item_request(&self) -> bool {
        !self.key.is_empty()
    }

    pub fn client_id(&self) -> &str {
        self.client_id.as_deref().unwrap_or_default()
    }

    /// Bind the request to a client. The first binding wins.
    pub fn resolve_client(&mut self, client: impl Into<String>) {
        if self.client_id.is_none() {
            self.client_id = Some(client.into());
        }
    }

    /// Record a failure and move to `Error`. The first failure wins.
    pub fn fail(&mut self, err: ApiError) -> Phase {
        if self.error.is_none() {
            self.status = err.status;
            self.error = Some(err);
        }
        Phase::Error
    }

    /// Record a failure with the reason phrase of `kind` as message.
    pub fn fail_kind(&mut self, kind: ErrorKind) -> Phase {
        self.fail(ApiError::from_status(kind.status()))
    }

    /// Record a storage failure. The client sees only the reason phrase.
    pub fn fail_storage(&mut self, err: StorageError) -> Phase {
        let kind = ErrorKind::from_storage(&err);
        if self.driver_error.is_none() {
            self.driver_error = Some(err.to_string());
        }
        self.fail_kind(kind)
    }

    /// The recorded failure, or one derived from `status`.
    pub fn error(&self) -> ApiError {
        self.error.clone().unwrap_or_else(|| {
            ApiError::new(self.status, reason_phrase(self.status))
        })
    }
}
