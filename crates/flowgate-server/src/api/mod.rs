//! API module for the Flowgate server
//!
//! Routes and handlers in front of the flow gateway.

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

pub mod errors;
pub mod flows;
pub mod health;

use flowgate_core::FlowGateway;

/// Build the router for API endpoints
pub fn build_router(gateway: Arc<FlowGateway>) -> Router {
    Router::new()
        .route("/", get(flows::root))
        // Flows
        .route("/flows", get(flows::list_flows_handler))
        .route("/flows/cache", delete(flows::invalidate_cache_handler))
        .route("/flows/:flow_id/execute", post(flows::execute_flow_handler))
        // Health check
        .route("/health", get(health::health_check))
        .with_state(gateway)
}
