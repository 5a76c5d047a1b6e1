//! Health check endpoint
//!
//! Reports whether the flow service can be reached through the gateway.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use flowgate_core::FlowGateway;

/// Flows echoed back in a healthy response
const SAMPLE_SIZE: usize = 3;

/// Health check handler
pub async fn health_check(State(gateway): State<Arc<FlowGateway>>) -> impl IntoResponse {
    info!("Health check requested");
    let timestamp = Utc::now().to_rfc3339();

    match gateway.list_flows().await {
        Ok(flows) => {
            let sample: Vec<_> = flows
                .iter()
                .take(SAMPLE_SIZE)
                .map(|flow| json!({"id": flow.id, "name": flow.name}))
                .collect();

            (
                StatusCode::OK,
                Json(json!({
                    "status": "UP",
                    "version": env!("CARGO_PKG_VERSION"),
                    "flowsCount": flows.len(),
                    "sampleFlows": sample,
                    "timestamp": timestamp,
                })),
            )
        }
        Err(err) => {
            warn!(error = %err, "Flow service unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "DOWN",
                    "version": env!("CARGO_PKG_VERSION"),
                    "errorDetails": {
                        "errorCode": err.kind().code(),
                        "errorMessage": err.caller_message(),
                    },
                    "timestamp": timestamp,
                })),
            )
        }
    }
}
