//! The flow gateway: cached listing and flow execution against the upstream
//! flow service.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use flowgate_monitoring::GatewayMetrics;
use flowgate_upstream::{HttpUpstreamClient, UpstreamClient};

use crate::cache::FlowCache;
use crate::clock::{Clock, SystemClock};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::retry::{self, RetryPolicy};
use crate::types::{parse_flow_listing, ExecutionRequest, ExecutionResult, Flow};

/// Listing endpoint of the flow service
pub const FLOWS_PATH: &str = "/api/v1/flows/";

/// Query sent with every listing call
pub const FLOWS_QUERY: &[(&str, &str)] = &[("components_only", "true"), ("get_all", "true")];

/// Prefix of the execution endpoint; the flow id is appended
pub const RUN_PATH: &str = "/api/v1/run";

/// Characters that would change the meaning of the execution URL.
/// http URLs treat `\` as a path separator and `%` starts an escape.
const FORBIDDEN_ID_CHARS: &[char] = &['/', '\\', '?', '#', '%'];

/// Path segments that URL normalisation resolves away
const DOT_SEGMENTS: &[&str] = &[".", ".."];

/// Gateway in front of the flow service.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct FlowGateway {
    config: GatewayConfig,
    client: Arc<dyn UpstreamClient>,
    clock: Arc<dyn Clock>,
    cache: FlowCache,
    list_policy: RetryPolicy,
    execute_policy: RetryPolicy,
}

impl std::fmt::Debug for FlowGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowGateway")
            .field("upstream", &self.config.upstream_base_url)
            .field("cache", &self.cache)
            .field("list_policy", &self.list_policy)
            .field("execute_policy", &self.execute_policy)
            .finish()
    }
}

impl FlowGateway {
    /// Build a gateway talking HTTP to `config.upstream_base_url`
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        config.validate()?;
        let client = HttpUpstreamClient::new(config.upstream_client_config())
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        info!(upstream = %client.base_url(), "Flow gateway ready");
        Ok(Self::with_client(config, Arc::new(client), Arc::new(SystemClock)))
    }

    /// Build a gateway over an existing client and clock
    pub fn with_client(config: GatewayConfig, client: Arc<dyn UpstreamClient>, clock: Arc<dyn Clock>) -> Self {
        let list_policy = RetryPolicy::from_config(&config);
        let execute_policy = if config.retry_execute {
            list_policy.clone()
        } else {
            RetryPolicy::none()
        };

        Self {
            cache: FlowCache::new(config.cache_ttl(), Arc::clone(&clock)),
            config,
            client,
            clock,
            list_policy,
            execute_policy,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// List the flows offered by the flow service.
    ///
    /// Served from the cache while it is fresh. Concurrent callers that miss
    /// the cache share a single upstream refresh.
    #[instrument(skip(self))]
    pub async fn list_flows(&self) -> GatewayResult<Vec<Flow>> {
        let client = Arc::clone(&self.client);
        let clock = Arc::clone(&self.clock);
        let policy = self.list_policy.clone();

        self.cache
            .get_or_refresh(move || async move {
                let outcome = fetch_flows(client.as_ref(), clock.as_ref(), &policy).await;
                if let Err(err) = &outcome {
                    report_failure("list_flows", err);
                }
                outcome
            })
            .await
    }

    /// Run a flow and fold the outcome into an [`ExecutionResult`].
    ///
    /// Invalid input is rejected before anything is sent upstream.
    #[instrument(skip(self, request), fields(flow_id = %flow_id))]
    pub async fn execute_flow(&self, flow_id: &str, request: ExecutionRequest) -> ExecutionResult {
        let started = Instant::now();
        let outcome = self.run_flow(flow_id, &request).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        GatewayMetrics::record_flow_execution(flow_id.trim(), elapsed_ms, outcome.is_ok());

        match outcome {
            Ok(payload) => ExecutionResult::succeeded(payload),
            Err(err) => {
                report_failure("execute_flow", &err);
                ExecutionResult::from(&err)
            }
        }
    }

    /// Drop the cached listing so the next call goes upstream
    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }

    async fn run_flow(&self, flow_id: &str, request: &ExecutionRequest) -> GatewayResult<Value> {
        let flow_id = validate_flow_id(flow_id)?;
        if request.input_value.trim().is_empty() {
            return Err(GatewayError::Validation("input_value must not be empty".to_string()));
        }

        let body = serde_json::to_value(request)
            .map_err(|e| GatewayError::Validation(format!("request cannot be encoded: {}", e)))?;
        let path = format!("{}/{}", RUN_PATH, flow_id);

        let client = self.client.as_ref();
        let (path, body) = (path.as_str(), &body);
        let response = retry::with_backoff(&self.execute_policy, self.clock.as_ref(), "execute_flow", move || async move {
            client.post(path, body).await.map_err(GatewayError::from)
        })
        .await?;

        response
            .json::<Value>()
            .map_err(|e| GatewayError::ResponseMalformed(format!("execution response is not JSON: {}", e)))
    }
}

async fn fetch_flows(client: &dyn UpstreamClient, clock: &dyn Clock, policy: &RetryPolicy) -> GatewayResult<Vec<Flow>> {
    let started = Instant::now();
    let response = retry::with_backoff(policy, clock, "list_flows", move || async move {
        client.get(FLOWS_PATH, FLOWS_QUERY).await.map_err(GatewayError::from)
    })
    .await?;

    let body: Value = response.json()?;
    let parsed = parse_flow_listing(body)?;
    if parsed.dropped > 0 {
        warn!(
            kept = parsed.flows.len(),
            dropped = parsed.dropped,
            "Flow listing contained invalid records"
        );
    }

    GatewayMetrics::record_flow_listing(
        parsed.flows.len(),
        parsed.dropped,
        started.elapsed().as_secs_f64() * 1000.0,
    );
    Ok(parsed.flows)
}

/// Trimmed flow id, or the reason it cannot be used in the execution URL
fn validate_flow_id(flow_id: &str) -> GatewayResult<&str> {
    let trimmed = flow_id.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::Validation("flow_id must not be empty".to_string()));
    }
    if trimmed.contains(FORBIDDEN_ID_CHARS) {
        return Err(GatewayError::Validation(format!(
            "flow_id must not contain any of '/', '\\', '?', '#', '%': {}",
            trimmed
        )));
    }
    if DOT_SEGMENTS.contains(&trimmed) {
        return Err(GatewayError::Validation(format!("flow_id must not be '{}'", trimmed)));
    }
    Ok(trimmed)
}

fn report_failure(operation: &str, err: &GatewayError) {
    match err {
        GatewayError::Validation(reason) => debug!(operation, reason = %reason, "Rejected invalid request"),
        GatewayError::ResponseMalformed(detail) => {
            error!(operation, malformed = true, detail = %detail, "Flow service response broke its contract")
        }
        GatewayError::UpstreamFailure { status, message } => {
            GatewayMetrics::record_operator_alert(operation, *status, message)
        }
        other => warn!(operation, kind = %other.kind(), error = %other, "Flow service call failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_id_validation() {
        assert_eq!(validate_flow_id("  abc-123 "), Ok("abc-123"));
        assert_eq!(validate_flow_id("v1.2..3"), Ok("v1.2..3"));
        for bad in ["", "   ", "a/b", "a\\b", "a?x=1", "a#frag", ".", " .. ", "a%2Fb", "%2E%2E"] {
            assert!(
                matches!(validate_flow_id(bad), Err(GatewayError::Validation(_))),
                "expected {:?} to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_new_rejects_unparseable_base_url() {
        let config = GatewayConfig {
            upstream_base_url: "not a url".to_string(),
            ..GatewayConfig::default()
        };
        assert!(matches!(FlowGateway::new(config), Err(GatewayError::Configuration(_))));
    }

    #[test]
    fn test_execute_retry_is_opt_in() {
        let client: Arc<dyn UpstreamClient> = Arc::new(
            HttpUpstreamClient::with_base_url("http://localhost:7860").unwrap(),
        );
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let default = FlowGateway::with_client(GatewayConfig::default(), Arc::clone(&client), Arc::clone(&clock));
        assert_eq!(default.execute_policy.max_retries, 0);
        assert_eq!(default.list_policy.max_retries, 2);

        let opted_in = FlowGateway::with_client(
            GatewayConfig { retry_execute: true, ..GatewayConfig::default() },
            client,
            clock,
        );
        assert_eq!(opted_in.execute_policy, opted_in.list_policy);
    }
}
