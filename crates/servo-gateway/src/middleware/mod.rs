//! Middleware stack for the servo gateway.
//!
//! Layer order: Request → Tracing → CORS → ClientIp → Access → Timeout → Handler
//!
//! Static routes (`/health`, `/console.js`) sit outside `ClientIp`, `Access`
//! and `Timeout`.

pub mod access;
pub mod client_ip;
pub mod cors;
pub mod timeout;
pub mod tracing;

pub use access::{AccessLayer, AccessPolicy};
pub use client_ip::{ClientAddr, ClientIpLayer, TrustedProxies};
pub use cors::create_cors_layer;
pub use timeout::TimeoutLayer;
pub use tracing::TracingLayer;

use crate::domain::config::ServoConfig;
use tower_http::cors::CorsLayer;

/// Middleware stack builder
pub struct MiddlewareStack {
    pub client_ip: ClientIpLayer,
    pub access: AccessLayer,
    pub timeout: TimeoutLayer,
    pub cors: CorsLayer,
    pub tracing: TracingLayer,
}

impl MiddlewareStack {
    /// Create middleware stack from servo config
    pub fn from_config(config: &ServoConfig) -> Self {
        Self {
            client_ip: ClientIpLayer::new(TrustedProxies::from(&config.security)),
            access: AccessLayer::new(AccessPolicy::new(
                &config.access,
                config.session.public_mode,
            )),
            timeout: TimeoutLayer::new(config.timeouts.request),
            cors: create_cors_layer(&config.cors, config.access.allow_origin.as_deref()),
            tracing: TracingLayer::new(),
        }
    }
}
