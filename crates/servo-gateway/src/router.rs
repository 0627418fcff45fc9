//! HTTP routing.
//!
//! `/health` and `/console.js` are static and bypass the access filter.
//! Every other path is an item path (or the store root) and goes through
//! the client address, access and timeout layers into the pipeline. `HEAD`
//! and `OPTIONS` are answered before any of those layers.

use crate::console;
use crate::domain::config::ServoConfig;
use crate::middleware::MiddlewareStack;
use crate::pipeline::Pipeline;
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// Build the full router for a pipeline.
pub fn build_router(pipeline: Arc<Pipeline>) -> Router {
    let config: &ServoConfig = pipeline.config();
    let stack = MiddlewareStack::from_config(config);
    let body_limit = config.max_body_size();

    let store_routes = Router::new()
        .fallback(handle_item)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(answer_bodiless))
                .layer(stack.client_ip)
                .layer(stack.access)
                .layer(stack.timeout),
        )
        .with_state(AppState { pipeline });

    let static_routes = Router::new()
        .route("/health", get(health_check))
        .route("/console.js", get(console::script));

    static_routes
        .merge(store_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(ServiceBuilder::new().layer(stack.tracing).layer(stack.cors))
}

/// `HEAD` and `OPTIONS` get an empty 200 without touching storage.
async fn answer_bodiless(req: Request, next: Next) -> Response {
    if req.method() == Method::HEAD || req.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(req).await
}

/// Store root and item requests.
async fn handle_item(State(state): State<AppState>, req: Request) -> Response {
    state.pipeline.run(req).await
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "servo",
        "version": crate::VERSION
    }))
}
