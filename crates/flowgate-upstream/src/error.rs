//! Failure types returned by the upstream client

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed upstream call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No complete response within the call's timeout
    Timeout,
    /// Transport level failure: DNS, refused or reset connection, broken body
    ConnectionError,
    /// A response arrived with a non-2xx status
    HttpError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::ConnectionError => write!(f, "connection error"),
            FailureKind::HttpError => write!(f, "http error"),
        }
    }
}

/// A classified upstream failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}{}: {message}", status_suffix(.status))]
pub struct UpstreamFailure {
    /// What went wrong
    pub kind: FailureKind,
    /// HTTP status, only set for `HttpError`
    pub status: Option<u16>,
    /// Transport error text or the response body
    pub message: String,
}

impl UpstreamFailure {
    /// Create a timeout failure
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Timeout,
            status: None,
            message: message.into(),
        }
    }

    /// Create a connection failure
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ConnectionError,
            status: None,
            message: message.into(),
        }
    }

    /// Create a failure for a non-2xx response
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::HttpError,
            status: Some(status),
            message: body.into(),
        }
    }

    /// Classify a reqwest error
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(format!("Request timeout: {}", error))
        } else if error.is_connect() {
            Self::connection(format!("Connection error: {}", error))
        } else {
            Self::connection(format!("Transport error: {}", error))
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" {}", s)).unwrap_or_default()
}

/// Result type for upstream calls
pub type UpstreamResult<T> = Result<T, UpstreamFailure>;

/// Error raised while building a client
#[derive(Error, Debug)]
pub enum ClientBuildError {
    /// The base URL could not be parsed
    #[error("Invalid upstream base URL '{url}': {reason}")]
    InvalidBaseUrl {
        /// The rejected URL
        url: String,
        /// Parser message
        reason: String,
    },

    /// The API key is not a valid header value
    #[error("Invalid upstream API key: {0}")]
    InvalidApiKey(String),

    /// reqwest refused the configuration
    #[error("Failed to create HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}
