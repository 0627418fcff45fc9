//! Content classes and negotiation.
//!
//! Requests are classified by `Content-Type` (what the client sends) and
//! `Accept` (what it wants back). Unknown or missing types fall back to
//! plain strings.

use axum::http::{header, HeaderMap};
use servo_storage::ItemValue;

/// Representations understood by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    /// `text/plain`
    String,
    /// `application/json`
    Json,
    /// `multipart/form-data` upload or `application/octet-stream`
    Blob,
    /// `application/base64`
    Base64,
    /// `text/html`
    Html,
}

impl ContentClass {
    /// Classify a single media type. Parameters (`; charset=...`) are ignored.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/plain" => Some(ContentClass::String),
            "text/html" => Some(ContentClass::Html),
            "application/json" => Some(ContentClass::Json),
            "application/base64" => Some(ContentClass::Base64),
            "multipart/form-data" | "application/octet-stream" => Some(ContentClass::Blob),
            _ => None,
        }
    }

    /// Class of the request body. Defaults to `String`.
    pub fn from_content_type(headers: &HeaderMap) -> Self {
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::from_media_type)
            .unwrap_or(ContentClass::String)
    }

    /// Requested response class: the first recognised entry of `Accept`.
    /// `None` means "use the stored representation".
    pub fn from_accept(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .and_then(|accept| accept.split(',').find_map(Self::from_media_type))
    }

    /// Class matching a stored value.
    pub fn of_value(value: &ItemValue) -> Self {
        match value {
            ItemValue::String(_) => ContentClass::String,
            ItemValue::Json(_) => ContentClass::Json,
            ItemValue::Blob(_) => ContentClass::Blob,
        }
    }

    /// Default response class for a stored value. Blobs go out as base64.
    pub fn default_output(value: &ItemValue) -> Self {
        match value {
            ItemValue::Blob(_) => ContentClass::Base64,
            other => Self::of_value(other),
        }
    }

    /// Response `Content-Type`
    pub fn mime(self) -> &'static str {
        match self {
            ContentClass::String => "text/plain; charset=utf-8",
            ContentClass::Json => "application/json",
            ContentClass::Blob => "application/octet-stream",
            ContentClass::Base64 => "application/base64",
            ContentClass::Html => "text/html; charset=utf-8",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ContentClass::String => "string",
            ContentClass::Json => "json",
            ContentClass::Blob => "blob",
            ContentClass::Base64 => "base64",
            ContentClass::Html => "html",
        }
    }
}

/// Whether `Accept` lists `text/html` anywhere.
pub fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |accept| accept.contains("text/html"))
}
