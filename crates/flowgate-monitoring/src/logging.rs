//! Structured logging module using tracing.
//!
//! JSON output is meant for log aggregation, pretty output for local runs.

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::MonitoringConfig;

/// Initialize structured logging
///
/// `RUST_LOG` takes precedence over the configured filter.
pub fn init_logging(config: &MonitoringConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .with_context(|| format!("Invalid log filter: {}", config.log_filter))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.enable_json_logging {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing::subscriber::set_global_default(registry.with(json_layer))
            .context("Failed to set global default subscriber")?;
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true);

        tracing::subscriber::set_global_default(registry.with(fmt_layer))
            .context("Failed to set global default subscriber")?;
    }

    tracing::info!(
        log_format = if config.enable_json_logging { "json" } else { "pretty" },
        "Logging initialized"
    );

    Ok(())
}

/// Trait to add log context to results
pub trait LogExt<T, E> {
    /// Log error with additional context before returning
    fn log_err(self, message: &str) -> Result<T, E>;

    /// Log success with additional context before returning
    fn log_ok(self, message: &str) -> Result<T, E>;
}

impl<T, E: std::fmt::Display> LogExt<T, E> for Result<T, E> {
    fn log_err(self, message: &str) -> Result<T, E> {
        if let Err(ref e) = self {
            tracing::error!("{}: {}", message, e);
        }
        self
    }

    fn log_ok(self, message: &str) -> Result<T, E> {
        if self.is_ok() {
            tracing::info!("{}", message);
        }
        self
    }
}
