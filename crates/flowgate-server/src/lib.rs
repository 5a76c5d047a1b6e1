//!
//! Flowgate Server - HTTP API in front of the flow gateway
//!
//! This module exports the server components and the `run` entry point.

/// API module
pub mod api;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

/// Server module
pub mod server;

use flowgate_monitoring::LogExt;

// Re-export key types
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::FlowgateServer;

/// Build the gateway from `config` and serve until shutdown
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    let server = FlowgateServer::new(config).log_err("Failed to build server")?;
    server.run().await.log_err("Server stopped with an error")
}
