//! Store-root rendering: the stats document and the public console.

use crate::domain::error::ApiError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use servo_storage::Session;
use std::time::Duration;

const CONSOLE_HTML: &str = include_str!("../assets/console.html");
const CONSOLE_JS: &str = include_str!("../assets/console.js");

/// Expiry format of the stats document.
pub const EXPIRY_FORMAT: &str = "%a %Y-%m-%d %H:%M:%S %Z";

/// Session summary returned by `GET /`.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub client: String,
    /// Session lifetime in seconds
    pub ttl: u64,
    pub expire_on: String,
}

impl Stats {
    pub fn new(session: &Session, ttl: Duration) -> Result<Self, ApiError> {
        let expire_on = chrono::DateTime::from_timestamp(session.expire_on, 0)
            .ok_or_else(ApiError::internal)?
            .format(EXPIRY_FORMAT)
            .to_string();
        Ok(Self {
            client: session.client.clone(),
            ttl: ttl.as_secs(),
            expire_on,
        })
    }
}

pub fn stats(session: &Session, ttl: Duration) -> Result<Response, ApiError> {
    Ok(Json(Stats::new(session, ttl)?).into_response())
}

/// The HTML console.
pub fn page() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        CONSOLE_HTML,
    )
        .into_response()
}

/// `GET /console.js`
pub async fn script() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/javascript")],
        CONSOLE_JS,
    )
        .into_response()
}
