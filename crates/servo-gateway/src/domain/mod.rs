//! Domain layer: configuration, errors, content classes and request state.

pub mod config;
pub mod content;
pub mod context;
pub mod error;

pub use config::{ConfigError, ServoConfig};
pub use content::ContentClass;
pub use context::{DbHandle, Phase, RequestContext};
pub use error::{ApiError, ErrorKind, GatewayError};
