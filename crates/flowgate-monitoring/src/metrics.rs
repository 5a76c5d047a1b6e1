//! Gateway metrics, emitted as structured tracing events.

use tracing::{debug, error, info};

/// Target used for every metric event so they can be filtered separately
pub const METRICS_TARGET: &str = "flowgate::metrics";

/// Flow gateway specific metrics
pub struct GatewayMetrics;

impl GatewayMetrics {
    /// Record a single upstream call attempt
    pub fn record_upstream_call(operation: &str, attempt: u32, outcome: &str, duration_ms: f64) {
        info!(
            target: METRICS_TARGET,
            operation,
            attempt,
            outcome,
            duration_ms,
            "upstream_call"
        );
    }

    /// Record a listing served from (or missing) the cache
    pub fn record_cache_lookup(hit: bool) {
        debug!(target: METRICS_TARGET, hit, "flow_cache_lookup");
    }

    /// Record a completed listing refresh
    pub fn record_flow_listing(flows: usize, dropped: usize, duration_ms: f64) {
        info!(
            target: METRICS_TARGET,
            flows,
            dropped,
            duration_ms,
            "flow_listing"
        );
    }

    /// Record flow execution
    pub fn record_flow_execution(flow_id: &str, duration_ms: f64, success: bool) {
        info!(
            target: METRICS_TARGET,
            flow_id,
            duration_ms,
            success,
            "flow_execution"
        );
    }

    /// Flag an upstream condition that needs an operator to look at it
    pub fn record_operator_alert(operation: &str, status: u16, message: &str) {
        error!(
            target: METRICS_TARGET,
            operation,
            status,
            operator_alert = true,
            "upstream failure: {}",
            message
        );
    }
}
