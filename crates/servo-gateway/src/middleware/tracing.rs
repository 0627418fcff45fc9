//! Request tracing.
//!
//! One `http_request` span per request, linked to an incoming W3C
//! `traceparent` when present. The pipeline's phase logs nest under it and
//! a completion event carries status, client and latency.

use axum::{body::Body, http::Request, response::Response};
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{debug, field, info_span, warn, Instrument, Span};

use crate::identity::CLIENT_HEADER;

/// Creates the per-request span.
#[derive(Clone, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService { inner }
    }
}

#[derive(Clone)]
pub struct TracingService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for TracingService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();

        let span = info_span!(
            "http_request",
            http.method = %req.method(),
            http.target = %req.uri().path(),
            http.status_code = field::Empty,
            servo.client = field::Empty,
            trace_id = field::Empty,
        );

        if let Some(parent) = TraceParent::from_request(&req) {
            span.record("trace_id", parent.trace_id.as_str());
            span.follows_from(parent.span());
        }

        Box::pin(
            async move {
                let started = Instant::now();
                let result = inner.call(req).await;

                if let Ok(response) = &result {
                    let status = response.status().as_u16();
                    let span = Span::current();
                    span.record("http.status_code", status);
                    if let Some(client) = response
                        .headers()
                        .get(CLIENT_HEADER)
                        .and_then(|v| v.to_str().ok())
                    {
                        span.record("servo.client", client);
                    }

                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    if status >= 500 {
                        warn!(status, elapsed_ms, "request failed");
                    } else {
                        debug!(status, elapsed_ms, "request completed");
                    }
                }
                result
            }
            .instrument(span),
        )
    }
}

/// Parsed W3C `traceparent` header: `version-trace_id-parent_id-flags`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TraceParent {
    trace_id: String,
    parent_id: String,
    sampled: bool,
}

impl TraceParent {
    fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let parent_id = parts.next()?;
        let flags = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let is_hex = |s: &str, len: usize| {
            s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
        };
        if !is_hex(version, 2) || !is_hex(trace_id, 32) || !is_hex(parent_id, 16) {
            return None;
        }
        // all-zero ids are invalid
        if trace_id.bytes().all(|b| b == b'0') || parent_id.bytes().all(|b| b == b'0') {
            return None;
        }
        let flags = u8::from_str_radix(flags, 16).ok()?;

        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            parent_id: parent_id.to_ascii_lowercase(),
            sampled: flags & 0x01 == 1,
        })
    }

    fn from_request<B>(req: &Request<B>) -> Option<Self> {
        let value = req.headers().get("traceparent")?.to_str().ok()?;
        Self::parse(value)
    }

    fn span(&self) -> Span {
        info_span!(
            "parent_trace",
            trace_id = %self.trace_id,
            parent_span_id = %self.parent_id,
            sampled = self.sampled,
        )
    }
}
