//! Configuration for the flow gateway
//!
//! Defaults first, then an optional YAML file named by `FLOWGATE_CONFIG`,
//! then individual environment variables.

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use flowgate_upstream::UpstreamClientConfig;

use crate::error::{GatewayError, GatewayResult};
use crate::retry::{MAX_BACKOFF_DELAY, MAX_MULTIPLIER, MAX_RETRIES};

/// Environment variable naming a YAML config file
pub const CONFIG_FILE_ENV: &str = "FLOWGATE_CONFIG";

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the flow service
    pub upstream_base_url: String,

    /// Timeout for listing calls
    pub list_timeout_ms: u64,

    /// Timeout for execution calls
    pub execute_timeout_ms: u64,

    /// How long a fetched flow listing is served from memory
    pub cache_ttl_ms: u64,

    /// Extra attempts after a transient failure
    pub max_retries: u32,

    /// Delay before the first retry
    pub retry_base_delay_ms: u64,

    /// Growth factor of the delay between retries
    pub retry_multiplier: f64,

    /// Relative jitter applied to each delay, 0.2 means ±20%
    pub retry_jitter: f64,

    /// Retry flow executions on transient failures.
    ///
    /// Off by default: the flow service may have started the run before the
    /// connection dropped, so a retry can execute the flow twice.
    pub retry_execute: bool,

    /// API key forwarded to the flow service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_api_key: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            upstream_base_url: "http://localhost:7860".to_string(),
            list_timeout_ms: 30_000,
            execute_timeout_ms: 60_000,
            cache_ttl_ms: 30_000,
            max_retries: 2,
            retry_base_delay_ms: 200,
            retry_multiplier: 2.0,
            retry_jitter: 0.2,
            retry_execute: false,
            upstream_api_key: None,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from an optional file and environment variables
    pub fn load() -> GatewayResult<Self> {
        let mut config = match env::var(CONFIG_FILE_ENV) {
            Ok(path) => Self::from_yaml_file(&path)?,
            Err(_) => Self::default(),
        };

        config.apply_env(|key| env::var(key).ok());
        config.validate()?;

        info!(
            upstream = %config.upstream_base_url,
            cache_ttl_ms = config.cache_ttl_ms,
            max_retries = config.max_retries,
            retry_execute = config.retry_execute,
            "Loaded gateway configuration"
        );
        Ok(config)
    }

    /// Read a YAML file; missing keys keep their defaults
    pub fn from_yaml_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> GatewayResult<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| GatewayError::Configuration(format!("Invalid YAML config: {}", e)))
    }

    /// Override fields from `FLOWGATE_*` variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("FLOWGATE_UPSTREAM_BASE_URL") {
            self.upstream_base_url = url;
        }

        override_parsed(&lookup, "FLOWGATE_LIST_TIMEOUT_MS", &mut self.list_timeout_ms);
        override_parsed(&lookup, "FLOWGATE_EXECUTE_TIMEOUT_MS", &mut self.execute_timeout_ms);
        override_parsed(&lookup, "FLOWGATE_CACHE_TTL_MS", &mut self.cache_ttl_ms);
        override_parsed(&lookup, "FLOWGATE_MAX_RETRIES", &mut self.max_retries);
        override_parsed(&lookup, "FLOWGATE_RETRY_BASE_DELAY_MS", &mut self.retry_base_delay_ms);

        if let Some(value) = lookup("FLOWGATE_RETRY_EXECUTE") {
            match value.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.retry_execute = true,
                "false" | "0" | "no" => self.retry_execute = false,
                _ => warn!("Invalid FLOWGATE_RETRY_EXECUTE value: {}", value),
            }
        }

        if let Some(api_key) = lookup("FLOWGATE_UPSTREAM_API_KEY") {
            self.upstream_api_key = if api_key.is_empty() { None } else { Some(api_key) };
        }
    }

    /// Reject values the gateway cannot work with
    pub fn validate(&self) -> GatewayResult<()> {
        if self.upstream_base_url.trim().is_empty() {
            return Err(GatewayError::Configuration("Upstream base URL is required".to_string()));
        }
        if self.list_timeout_ms == 0 || self.execute_timeout_ms == 0 {
            return Err(GatewayError::Configuration("Timeouts must be greater than zero".to_string()));
        }
        if !(0.0..1.0).contains(&self.retry_jitter) {
            return Err(GatewayError::Configuration(format!(
                "Retry jitter must be in [0, 1), got {}",
                self.retry_jitter
            )));
        }
        if !(1.0..=MAX_MULTIPLIER).contains(&self.retry_multiplier) {
            return Err(GatewayError::Configuration(format!(
                "Retry multiplier must be in [1, {}], got {}",
                MAX_MULTIPLIER, self.retry_multiplier
            )));
        }
        if self.max_retries > MAX_RETRIES {
            return Err(GatewayError::Configuration(format!(
                "At most {} retries are allowed, got {}",
                MAX_RETRIES, self.max_retries
            )));
        }
        if Duration::from_millis(self.retry_base_delay_ms) > MAX_BACKOFF_DELAY {
            return Err(GatewayError::Configuration(format!(
                "Retry base delay must not exceed {}ms, got {}",
                MAX_BACKOFF_DELAY.as_millis(),
                self.retry_base_delay_ms
            )));
        }
        Ok(())
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_millis(self.list_timeout_ms)
    }

    pub fn execute_timeout(&self) -> Duration {
        Duration::from_millis(self.execute_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Settings for the HTTP client
    pub fn upstream_client_config(&self) -> UpstreamClientConfig {
        UpstreamClientConfig {
            base_url: self.upstream_base_url.clone(),
            get_timeout: self.list_timeout(),
            post_timeout: self.execute_timeout(),
            api_key: self.upstream_api_key.clone(),
            ..UpstreamClientConfig::default()
        }
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!("Invalid {} value: {}", key, raw),
        }
    }
}
