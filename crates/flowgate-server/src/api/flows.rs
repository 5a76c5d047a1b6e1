//! Flow listing and execution handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use flowgate_core::{ExecutionRequest, ExecutionResult, Flow, FlowGateway};

use super::errors::ApiError;

/// Body of `GET /flows`
#[derive(Debug, Serialize)]
pub struct FlowListResponse {
    pub flows: Vec<Flow>,
}

pub async fn root() -> Json<Value> {
    Json(json!({"message": "Flow Gateway API"}))
}

/// List the flows offered by the flow service
pub async fn list_flows_handler(State(gateway): State<Arc<FlowGateway>>) -> Result<Json<FlowListResponse>, ApiError> {
    let flows = gateway.list_flows().await?;
    Ok(Json(FlowListResponse { flows }))
}

/// Run a flow.
///
/// Always answers 200; failures are carried inside the execution result.
pub async fn execute_flow_handler(
    State(gateway): State<Arc<FlowGateway>>,
    Path(flow_id): Path<String>,
    Json(request): Json<ExecutionRequest>,
) -> Json<ExecutionResult> {
    Json(gateway.execute_flow(&flow_id, request).await)
}

/// Drop the cached flow listing
pub async fn invalidate_cache_handler(State(gateway): State<Arc<FlowGateway>>) -> StatusCode {
    gateway.invalidate_cache();
    info!("Flow listing cache invalidated on request");
    StatusCode::NO_CONTENT
}
