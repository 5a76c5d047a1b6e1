//! Flowgate server: binds the listener and serves the API until shutdown.

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use flowgate_core::FlowGateway;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Main server implementation
#[derive(Debug, Clone)]
pub struct FlowgateServer {
    config: ServerConfig,
    gateway: Arc<FlowGateway>,
}

impl FlowgateServer {
    /// Create a server with an HTTP gateway built from `config`
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let gateway = FlowGateway::new(config.gateway.clone())?;
        Ok(Self::with_gateway(config, Arc::new(gateway)))
    }

    /// Create a server around an existing gateway
    pub fn with_gateway(config: ServerConfig, gateway: Arc<FlowGateway>) -> Self {
        Self { config, gateway }
    }

    pub fn gateway(&self) -> &Arc<FlowGateway> {
        &self.gateway
    }

    /// Router with CORS and request tracing applied
    pub fn app(&self) -> ServerResult<Router> {
        let cors = cors_layer(&self.config.cors_allowed_origins)?;
        Ok(crate::api::build_router(Arc::clone(&self.gateway))
            .layer(cors)
            .layer(TraceLayer::new_for_http()))
    }

    /// Run the server until Ctrl-C
    pub async fn run(self) -> ServerResult<()> {
        info!("Starting Flowgate server");

        let app = self.app()?;
        let listener = TcpListener::bind(self.config.socket_addr()?).await?;
        let addr = listener.local_addr()?;
        info!(upstream = %self.config.gateway.upstream_base_url, "Listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Flowgate server stopped");
        Ok(())
    }
}

/// Origin entry that opens the API to every origin
pub const ANY_ORIGIN: &str = "*";

/// CORS policy for the configured origins.
///
/// Listed origins may send credentials. A `*` entry allows any origin
/// without credentials, since browsers refuse that combination.
pub fn cors_layer(origins: &[String]) -> ServerResult<CorsLayer> {
    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

    if origins.iter().any(|origin| origin.trim() == ANY_ORIGIN) {
        if origins.len() > 1 {
            warn!("CORS origin list contains '*'; other entries are ignored");
        }
        return Ok(CorsLayer::new()
            .allow_origin(AllowOrigin::any())
            .allow_methods(methods)
            .allow_headers(AllowHeaders::mirror_request()));
    }

    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| ServerError::ConfigError(format!("Invalid CORS origin {}: {}", origin, e)))
        })
        .collect::<ServerResult<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(methods)
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler the server runs until killed
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
