//! API Server
//!
//! Serves the status API until the service's shutdown token fires.

use crate::controlplane::service::Service;
use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::rest::RestRouter;

// =============================================================================
// Server Configuration
// =============================================================================

/// Default status API bind address
pub const DEFAULT_API_ADDR: &str = "0.0.0.0:8090";

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
}

impl ApiServerConfig {
    pub fn new(rest_addr: SocketAddr) -> Self {
        Self { rest_addr }
    }
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

pub struct ApiServer {
    config: ApiServerConfig,
    service: Arc<Service>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, service: Arc<Service>) -> Self {
        Self { config, service }
    }

    /// Bind and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let app = RestRouter::new(self.service.clone())
            .build()
            .layer(TraceLayer::new_for_http());

        let listener = tokio::net::TcpListener::bind(self.config.rest_addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind REST server: {}", e)))?;
        info!(addr = %self.config.rest_addr, "REST API listening");

        let shutdown = self.service.shutdown_token();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("REST server shutting down");
            })
            .await
            .map_err(|e| Error::Internal(format!("REST server error: {}", e)))?;

        Ok(())
    }
}
