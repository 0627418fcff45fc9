//! CORS middleware.
//!
//! Wrapper around tower-http CORS. The allowed origin is the configured
//! `access.allow_origin`, or any origin when none is set. Preflight
//! requests are answered here and never reach the handler.

use crate::domain::config::CorsConfig;
use axum::http::{HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer as TowerCorsLayer};
use tracing::warn;

/// Create CORS layer from servo config
pub fn create_cors_layer(config: &CorsConfig, allow_origin: Option<&str>) -> TowerCorsLayer {
    let origin = match allow_origin.map(HeaderValue::from_str) {
        Some(Ok(value)) => AllowOrigin::exact(value),
        Some(Err(e)) => {
            warn!(error = %e, "Invalid allow_origin, CORS falls back to any origin");
            AllowOrigin::any()
        }
        None => AllowOrigin::any(),
    };

    let methods: Vec<Method> = config
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();

    let mut cors = TowerCorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .max_age(Duration::from_secs(config.max_age));

    if config.allowed_headers.iter().any(|h| h == "*") {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Vec<HeaderName> = config
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        cors = cors.allow_headers(headers);
    }

    if !config.expose_headers.is_empty() {
        let expose: Vec<HeaderName> = config
            .expose_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        cors = cors.expose_headers(expose);
    }

    cors
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    async fn preflight(allow_origin: Option<&str>, origin: &str) -> axum::response::Response {
        let app = Router::new()
            .route("/item", get(|| async { "unreachable" }))
            .layer(create_cors_layer(&CorsConfig::default(), allow_origin));
        app.oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/item")
                .header("origin", origin)
                .header("access-control-request-method", "PUT")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_any_origin_by_default() {
        let resp = preflight(None, "https://anywhere.example").await;
        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_configured_origin_is_echoed() {
        let resp = preflight(Some("https://example.com"), "https://example.com").await;
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "https://example.com"
        );
    }

    #[tokio::test]
    async fn test_expose_headers_on_simple_request() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(create_cors_layer(&CorsConfig::default(), None));
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("origin", "https://a.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let expose = resp
            .headers()
            .get("access-control-expose-headers")
            .unwrap()
            .to_str()
            .unwrap()
            .to_ascii_lowercase();
        assert!(expose.contains("authorization"));
        assert!(expose.contains("x-servo-client"));
    }
}
