//! Monitoring module for the Flowgate gateway.
//!
//! Wires up structured logging and exposes the gateway's metric events.

use serde::{Deserialize, Serialize};
use tracing::info;

pub mod logging;
pub mod metrics;

/// Configuration for initializing the monitoring system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Log level filter (e.g., "info,flowgate_core=debug")
    pub log_filter: String,
    /// Emit JSON lines instead of human readable output
    pub enable_json_logging: bool,
    /// Environment (dev, staging, prod)
    pub environment: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "flowgate".to_string(),
            log_filter: "info".to_string(),
            enable_json_logging: false,
            environment: "dev".to_string(),
        }
    }
}

/// Initialize monitoring system
pub fn init(config: &MonitoringConfig) -> anyhow::Result<()> {
    logging::init_logging(config)?;

    info!(
        service_name = %config.service_name,
        environment = %config.environment,
        "Monitoring initialized"
    );

    Ok(())
}


// Exported types
pub use crate::logging::{init_logging, LogExt};
pub use crate::metrics::GatewayMetrics;
