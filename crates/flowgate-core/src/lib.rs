//! Flowgate Core
//!
//! The flow gateway sits between a client application and the upstream flow
//! service. It lists flows through a short-lived cache, runs flows with
//! caller input, retries transient transport failures with backoff, and
//! turns every upstream failure into one closed error classification.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod retry;
pub mod types;

// Re-export key types
pub use cache::FlowCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GatewayConfig, CONFIG_FILE_ENV};
pub use error::{ErrorKind, GatewayError, GatewayResult};
pub use gateway::FlowGateway;
pub use retry::{with_backoff, RetryPolicy};
pub use types::{parse_flow_listing, ExecutionRequest, ExecutionResult, Flow, IoType, ParsedFlows};
