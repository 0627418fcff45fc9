//! Servo Gateway - HTTP surface of the servo item store.
//!
//! Every client owns a namespace of items (string, JSON or blob) addressed
//! by the request path. Clients are identified by a bearer token, the
//! `X-Servo-Client` header or the `Servo-Client` cookie; anonymous clients
//! get a fresh identity and session.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        SERVO GATEWAY                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Tracing → CORS → ClientIp → Access → Timeout                    │
//! │                                  │                               │
//! │  ┌───────────────────────────────┴───────────────────────────┐   │
//! │  │                     Request Pipeline                      │   │
//! │  │  Init (identity)                                          │   │
//! │  │   → Session cycle  (connect / query / wait / read)        │   │
//! │  │   → Item cycle     (connect / query / wait / read)        │   │
//! │  │   → Finalizer      (status, negotiation, headers)         │   │
//! │  └───────────────────────────────┬───────────────────────────┘   │
//! └──────────────────────────────────┼───────────────────────────────┘
//!                                    │
//!                         servo-storage (Store port)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use servo_gateway::{ServoConfig, ServoService};
//!
//! let store = Arc::new(SqliteStore::open(&config.database.to_sqlite_config()).await?);
//! let mut service = ServoService::new(config, store)?;
//! let addr = service.start().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod console;
pub mod domain;
pub mod identity;
pub mod middleware;
pub mod pipeline;
pub mod router;
pub mod service;

// Re-exports for public API
pub use domain::config::{parse_duration, ServoConfig};
pub use domain::content::ContentClass;
pub use domain::error::{ApiError, ErrorKind, GatewayError};
pub use identity::{Hs256Tokens, TokenAuthority, TokenError};
pub use pipeline::Pipeline;
pub use router::build_router;
pub use service::ServoService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
