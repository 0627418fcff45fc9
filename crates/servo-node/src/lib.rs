//! # Servo Node
//!
//! Bootstrap for the servo executable.
//!
//! ## Startup Sequence
//!
//! 1. Parse command line arguments
//! 2. Load `servo.toml` (explicit path, `$HOME/.servo`, `/etc/servo`, or defaults)
//! 3. Apply `SERVO_*` environment overrides
//! 4. Open the SQLite pool, retrying while the file is locked or missing
//! 5. Create the schema if needed
//! 6. Serve until Ctrl+C, then drain and close the pool

use anyhow::{Context, Result};
use clap::Parser;
use servo_gateway::{parse_duration, ServoConfig, ServoService};
use servo_storage::SqliteStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Config file name looked up in the default locations.
pub const CONFIG_FILE: &str = "servo.toml";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "servo")]
#[command(about = "Session-scoped key/value item store over HTTP", long_about = None)]
#[command(version)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "SERVO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `debug` when set.
pub fn init_logging(debug: bool, json: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
    };
    installed.context("failed to install tracing subscriber")
}

/// Candidate config locations, most specific first.
fn default_locations() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(Path::new(&home).join(".servo").join(CONFIG_FILE));
    }
    paths.push(Path::new("/etc/servo").join(CONFIG_FILE));
    paths
}

/// Read a TOML config file.
pub fn read_config(path: &Path) -> Result<ServoConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Load configuration from `path`, or from the first default location that
/// exists, or fall back to defaults.
pub fn load_config(path: Option<&Path>) -> Result<ServoConfig> {
    if let Some(path) = path {
        return read_config(path);
    }

    for candidate in default_locations() {
        if candidate.is_file() {
            info!(path = %candidate.display(), "Loading configuration");
            return read_config(&candidate);
        }
    }

    info!("No configuration file found, using defaults");
    Ok(ServoConfig::default())
}

/// Apply `SERVO_*` overrides looked up through `lookup`.
///
/// Unparseable values are logged and ignored.
pub fn apply_env<F>(config: &mut ServoConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("SERVO_DB") {
        config.database.url = url;
    }

    if let Some(ttl) = lookup("SERVO_TTL") {
        match parse_duration(&ttl) {
            Ok(ttl) => config.session.ttl = ttl,
            Err(e) => warn!(value = %ttl, "Ignoring SERVO_TTL: {}", e),
        }
    }

    if let Some(port) = lookup("SERVO_PORT") {
        match port.parse() {
            Ok(port) => config.http.port = port,
            Err(_) => warn!(value = %port, "Ignoring SERVO_PORT: not a port number"),
        }
    }

    if let Some(origin) = lookup("SERVO_ALLOW_ORIGIN") {
        config.access.allow_origin = Some(origin);
    }

    if let Some(public) = lookup("SERVO_PUBLIC") {
        config.session.public_mode = matches!(public.as_str(), "1" | "true" | "yes");
    }

    if let Some(secret) = lookup("SERVO_JWT_SECRET") {
        if secret.is_empty() {
            warn!("Ignoring empty SERVO_JWT_SECRET");
        } else {
            config.auth.enabled = true;
            config.auth.secret = Some(secret);
            info!("Bearer token identity enabled from environment");
        }
    }
}

/// Run the server until Ctrl+C.
pub async fn run(config: ServoConfig) -> Result<()> {
    config.validate().context("invalid configuration")?;

    let db = &config.database;
    info!(url = %db.url, "Opening database");
    let store = SqliteStore::open_with_retry(&db.to_sqlite_config(), db.attempts, db.attempt_wait)
        .await
        .context("database is not available")?;

    let items = store
        .ensure_schema()
        .await
        .context("failed to prepare schema")?;

    let store = Arc::new(store);
    let mut service = ServoService::new(config, store.clone())?;
    let addr = service.start().await?;
    info!(%addr, items, "Servo is running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    info!("Shutting down");
    service.shutdown().await?;
    store.close().await;

    Ok(())
}
