//! Servo service - main entry point.
//!
//! Owns the pipeline and the HTTP listener task.

use crate::domain::config::ServoConfig;
use crate::domain::error::GatewayError;
use crate::pipeline::Pipeline;
use crate::router::build_router;
use axum::Router;
use servo_storage::{Store, SystemTimeSource, TimeSource};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Servo service state
pub struct ServoService {
    config: Arc<ServoConfig>,
    pipeline: Arc<Pipeline>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<std::io::Result<()>>>,
}

impl ServoService {
    /// Create a new service over `store`
    pub fn new(config: ServoConfig, store: Arc<dyn Store>) -> Result<Self, GatewayError> {
        Self::with_clock(config, store, Arc::new(SystemTimeSource))
    }

    /// Create a new service with an explicit clock
    pub fn with_clock(
        config: ServoConfig,
        store: Arc<dyn Store>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let config = Arc::new(config);
        let pipeline = Arc::new(Pipeline::with_clock(Arc::clone(&config), store, clock));

        Ok(Self {
            config,
            pipeline,
            shutdown_tx: None,
            server: None,
        })
    }

    pub fn config(&self) -> &ServoConfig {
        &self.config
    }

    /// The complete router, for serving or for in-process requests.
    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.pipeline))
    }

    /// Bind the listener and serve in the background.
    ///
    /// Returns the bound address (useful with port 0).
    pub async fn start(&mut self) -> Result<SocketAddr, GatewayError> {
        if self.server.is_some() {
            return Err(GatewayError::AlreadyStarted);
        }

        let addr = self.config.http_addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| GatewayError::Bind(e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        info!(addr = %local_addr, "Starting servo HTTP server");
        self.server = Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        }));

        Ok(local_addr)
    }

    /// Trigger graceful shutdown and wait for in-flight requests.
    pub async fn shutdown(&mut self) -> Result<(), GatewayError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let Some(server) = self.server.take() else {
            return Ok(());
        };

        match server.await {
            Ok(Ok(())) => {
                info!("Servo HTTP server stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "HTTP server error");
                Err(GatewayError::Internal(e.to_string()))
            }
            Err(e) => Err(GatewayError::Internal(e.to_string())),
        }
    }

    /// Whether the listener task is running
    pub fn is_running(&self) -> bool {
        self.server.as_ref().is_some_and(|h| !h.is_finished())
    }
}
