//! Servo configuration with validation.
//!
//! Loaded once at startup and shared read-only as `Arc<ServoConfig>`.

use serde::{Deserialize, Serialize};
use servo_storage::SqliteConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Main servo configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    /// HTTP listener
    pub http: HttpConfig,
    /// Session lifetime and public mode
    pub session: SessionConfig,
    /// Origin / client address allow-lists
    pub access: AccessConfig,
    /// Per-representation body size limits
    pub limits: LimitsConfig,
    /// Bearer token identity
    pub auth: AuthConfig,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Database pool
    pub database: DatabaseConfig,
    /// CORS headers
    pub cors: CorsConfig,
    /// Trusted proxy configuration
    pub security: SecurityConfig,
}

impl ServoConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.ttl.is_zero() {
            return Err(ConfigError::InvalidTimeout("session ttl cannot be 0".into()));
        }

        if self.limits.string_size == 0 || self.limits.json_size == 0 || self.limits.blob_size == 0
        {
            return Err(ConfigError::InvalidLimit("size limits cannot be 0".into()));
        }

        if self.timeouts.request.is_zero() || self.timeouts.storage_wait.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request and storage_wait timeouts cannot be 0".into(),
            ));
        }

        if self.timeouts.connect_retry > self.timeouts.connect {
            return Err(ConfigError::InvalidTimeout(
                "connect_retry cannot exceed connect".into(),
            ));
        }

        if self.auth.enabled && self.auth.secret.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingSecret);
        }

        if let Some(origin) = &self.access.allow_origin {
            if origin.is_empty() || origin.parse::<axum::http::HeaderValue>().is_err() {
                return Err(ConfigError::Invalid(format!(
                    "allow_origin is not a valid header value: {:?}",
                    origin
                )));
            }
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidLimit(
                "database.max_connections cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Largest body any item request may carry.
    pub fn max_body_size(&self) -> usize {
        self.limits
            .string_size
            .max(self.limits.json_size)
            .max(self.limits.blob_size)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8080)
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session time-to-live
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Public mode: serve the HTML console and relax the Origin requirement
    pub public_mode: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            public_mode: false,
        }
    }
}

/// Access filtering
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Only this Origin may issue item requests
    pub allow_origin: Option<String>,
    /// Only this client address may connect
    pub allow_ipaddr: Option<IpAddr>,
}

/// Body size limits in bytes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Limit for text/plain and text/html bodies
    pub string_size: usize,
    /// Limit for application/json bodies
    pub json_size: usize,
    /// Limit for multipart/form-data and application/base64 bodies
    pub blob_size: usize,
    /// Longest accepted item key
    pub max_key_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            string_size: 1024 * 1024,   // 1MB
            json_size: 1024 * 1024,     // 1MB
            blob_size: 4 * 1024 * 1024, // 4MB
            max_key_length: 2048,
        }
    }
}

/// Bearer token identity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Accept and issue `Authorization: Bearer` tokens
    pub enabled: bool,
    /// HMAC secret for token signatures
    pub secret: Option<String>,
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request bound
    #[serde(with = "humantime_serde")]
    pub request: Duration,
    /// Bound on a single in-flight storage operation
    #[serde(with = "humantime_serde")]
    pub storage_wait: Duration,
    /// Total time spent retrying an unavailable store
    #[serde(with = "humantime_serde")]
    pub connect: Duration,
    /// Pause between connect attempts
    #[serde(with = "humantime_serde")]
    pub connect_retry: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            storage_wait: Duration::from_secs(10),
            connect: Duration::from_secs(5),
            connect_retry: Duration::from_millis(100),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Pool size
    pub max_connections: u32,
    /// Wait for a free pooled connection before reporting "not ready"
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
    /// SQLite busy timeout
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
    /// Startup connection attempts
    pub attempts: u32,
    /// Pause between startup connection attempts
    #[serde(with = "humantime_serde")]
    pub attempt_wait: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://servo.db".to_string(),
            max_connections: 8,
            acquire_timeout: Duration::from_secs(1),
            busy_timeout: Duration::from_secs(5),
            attempts: 5,
            attempt_wait: Duration::from_secs(5),
        }
    }
}

impl DatabaseConfig {
    /// Convert to the storage adapter configuration
    pub fn to_sqlite_config(&self) -> SqliteConfig {
        SqliteConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            acquire_timeout: self.acquire_timeout,
            busy_timeout: self.busy_timeout,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed request headers
    pub allowed_headers: Vec<String>,
    /// Response headers readable by scripts
    pub expose_headers: Vec<String>,
    /// Max age for preflight cache (seconds)
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS", "HEAD"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_headers: ["Content-Type", "Accept", "Authorization", "X-Servo-Client"]
                .into_iter()
                .map(String::from)
                .collect(),
            expose_headers: ["Authorization", "X-Servo-Client"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_age: 86400, // 24 hours
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// List of trusted proxy IPs
    pub trusted_proxies: Vec<IpAddr>,
    /// Trust private IPs (10.x, 172.16.x, 192.168.x)
    pub trust_private_ips: bool,
    /// Number of proxies in chain (for X-Forwarded-For parsing)
    pub proxy_count: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            trusted_proxies: Vec::new(),
            trust_private_ips: false,
            proxy_count: 1,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Token auth enabled without a signing secret
    #[error("auth is enabled but no secret is configured")]
    MissingSecret,
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Humantime serde module for Duration serialization
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .ok()
                .and_then(|m| m.checked_mul(60))
                .map(Duration::from_secs)
                .ok_or("invalid minutes")
        } else if let Some(hours) = s.strip_suffix('h') {
            hours
                .trim()
                .parse::<u64>()
                .ok()
                .and_then(|h| h.checked_mul(3600))
                .map(Duration::from_secs)
                .ok_or("invalid hours")
        } else {
            // Plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}

pub use humantime_serde::parse_duration;
