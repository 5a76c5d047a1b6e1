//! Configuration for the Flowgate server
//!
//! HTTP settings come from `SERVER_*`, `LOG_*` and `CORS_ALLOWED_ORIGINS`;
//! the gateway section is loaded by [`GatewayConfig::load`].

use std::env;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use flowgate_core::GatewayConfig;
use flowgate_monitoring::MonitoringConfig;

use crate::error::{ServerError, ServerResult};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub bind_address: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Origins allowed to call the API from a browser
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: Vec<String>,

    /// Upstream and cache settings
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_json: false,
            cors_allowed_origins: default_cors_origins(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables and optional config file
    pub fn load() -> ServerResult<Self> {
        let mut config = Self {
            gateway: GatewayConfig::load()?,
            ..Self::default()
        };
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Override HTTP and logging settings from the environment
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SERVER_HOST") {
            self.bind_address = host;
        }

        if let Some(port) = lookup("SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.port = port;
            } else {
                warn!("Invalid SERVER_PORT value: {}", port);
            }
        }

        if let Some(log_level) = lookup("LOG_LEVEL") {
            self.log_level = log_level;
        }

        if let Some(log_json) = lookup("LOG_JSON") {
            self.log_json = log_json.to_lowercase() == "true" || log_json == "1";
        }

        if let Some(origins) = lookup("CORS_ALLOWED_ORIGINS") {
            self.cors_allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect();
        }
    }

    /// Address to bind the listener to
    pub fn socket_addr(&self) -> ServerResult<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| ServerError::ConfigError(format!("Invalid bind address {}:{}: {}", self.bind_address, self.port, e)))
    }

    /// Logging settings derived from this configuration
    pub fn monitoring_config(&self) -> MonitoringConfig {
        MonitoringConfig {
            service_name: "flowgate".to_string(),
            log_filter: self.log_level.clone(),
            enable_json_logging: self.log_json,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        }
    }
}
