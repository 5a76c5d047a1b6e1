//! Flowgate Upstream
//!
//! Thin HTTP client bound to the upstream flow service. Every call carries a
//! wall-clock timeout and comes back either as a raw response body or as a
//! classified [`UpstreamFailure`]; retry decisions belong to the caller.

pub mod client;
pub mod error;

// Re-export key types
pub use client::{HttpUpstreamClient, RawResponse, UpstreamClient, UpstreamClientConfig, API_KEY_HEADER};
pub use error::{ClientBuildError, FailureKind, UpstreamFailure, UpstreamResult};
