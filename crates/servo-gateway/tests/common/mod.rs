//! Shared harness: an in-process router over the in-memory store.

#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use servo_gateway::{build_router, Pipeline, ServoConfig};
use servo_storage::{InMemoryStore, ManualTimeSource, Store};
use std::sync::Arc;
use tower::ServiceExt;

pub const NOW: i64 = 1_700_000_000;

pub struct Harness {
    pub store: InMemoryStore,
    pub clock: Arc<ManualTimeSource>,
    pub router: Router,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ServoConfig::default())
    }

    pub fn with_config(config: ServoConfig) -> Self {
        let store = InMemoryStore::new();
        Self::with_store(config, store.clone(), Arc::new(store))
    }

    /// `store` serves the requests; `memory` is the table view for asserts.
    pub fn with_store(config: ServoConfig, memory: InMemoryStore, store: Arc<dyn Store>) -> Self {
        let clock = Arc::new(ManualTimeSource::new(NOW));
        let pipeline = Pipeline::with_clock(Arc::new(config), store, clock.clone());
        Self {
            store: memory,
            clock,
            router: build_router(Arc::new(pipeline)),
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Reply {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec();
        Reply {
            status,
            headers,
            body,
        }
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).map(|v| v.to_str().unwrap())
    }

    pub fn client(&self) -> String {
        self.headers
            .get("x-servo-client")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }
}

/// Request builder with a client id preset.
pub fn request(method: Method, uri: &str, client: Option<&str>) -> axum::http::request::Builder {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(client) = client {
        builder = builder.header("x-servo-client", client);
    }
    builder
}

pub fn get(uri: &str, client: &str, accept: Option<&str>) -> Request<Body> {
    let mut builder = request(Method::GET, uri, Some(client));
    if let Some(accept) = accept {
        builder = builder.header(header::ACCEPT, accept);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn write(
    method: Method,
    uri: &str,
    client: &str,
    content_type: &str,
    body: impl Into<Body>,
) -> Request<Body> {
    request(method, uri, Some(client))
        .header(header::CONTENT_TYPE, content_type)
        .body(body.into())
        .unwrap()
}
