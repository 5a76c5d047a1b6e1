use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use flowgate_upstream::{FailureKind, UpstreamFailure};

/// Longest upstream rejection text passed on to callers
pub const MAX_CALLER_DETAIL_LEN: usize = 512;

/// Gateway error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Caller input failed pre-flight validation; nothing was sent upstream
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport failure on the last attempt
    #[error("Connection error after {attempts} attempt(s): {message}")]
    Connection {
        /// Attempts made, including the first
        attempts: u32,
        /// Transport error text
        message: String,
    },

    /// Timed out on the last attempt
    #[error("Timeout after {attempts} attempt(s): {message}")]
    Timeout {
        /// Attempts made, including the first
        attempts: u32,
        /// Timeout error text
        message: String,
    },

    /// Upstream rejected the request itself (4xx)
    #[error("Upstream rejected request with status {status}: {message}")]
    ClientRejected {
        /// HTTP status
        status: u16,
        /// Response body
        message: String,
    },

    /// Upstream failed internally (5xx or another unexpected status)
    #[error("Upstream failure with status {status}: {message}")]
    UpstreamFailure {
        /// HTTP status
        status: u16,
        /// Response body
        message: String,
    },

    /// Upstream answered with a body that breaks its contract
    #[error("Malformed upstream response: {0}")]
    ResponseMalformed(String),

    /// Gateway could not be constructed from its configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Data-free discriminant of [`GatewayError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    ConnectionError,
    Timeout,
    ClientRejected,
    UpstreamFailure,
    ResponseMalformed,
    ConfigurationError,
}

impl ErrorKind {
    /// Whether a failure of this kind may succeed when tried again
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::ConnectionError | ErrorKind::Timeout)
    }

    /// Stable upper-case code for API payloads
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "ERR_VALIDATION",
            ErrorKind::ConnectionError => "ERR_UPSTREAM_UNAVAILABLE",
            ErrorKind::Timeout => "ERR_UPSTREAM_TIMEOUT",
            ErrorKind::ClientRejected => "ERR_UPSTREAM_REJECTED",
            ErrorKind::UpstreamFailure => "ERR_UPSTREAM_FAILURE",
            ErrorKind::ResponseMalformed => "ERR_UPSTREAM_MALFORMED_RESPONSE",
            ErrorKind::ConfigurationError => "ERR_CONFIGURATION",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl GatewayError {
    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Validation(_) => ErrorKind::ValidationError,
            GatewayError::Connection { .. } => ErrorKind::ConnectionError,
            GatewayError::Timeout { .. } => ErrorKind::Timeout,
            GatewayError::ClientRejected { .. } => ErrorKind::ClientRejected,
            GatewayError::UpstreamFailure { .. } => ErrorKind::UpstreamFailure,
            GatewayError::ResponseMalformed(_) => ErrorKind::ResponseMalformed,
            GatewayError::Configuration(_) => ErrorKind::ConfigurationError,
        }
    }

    /// Check if the error is worth retrying
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// Record how many attempts were made before giving up
    pub fn with_attempts(self, total: u32) -> Self {
        match self {
            GatewayError::Connection { message, .. } => GatewayError::Connection { attempts: total, message },
            GatewayError::Timeout { message, .. } => GatewayError::Timeout { attempts: total, message },
            other => other,
        }
    }

    /// Message safe to show to the caller.
    ///
    /// Transport and internal details stay in the logs; only validation
    /// reasons and sanitised upstream rejections are passed through.
    pub fn caller_message(&self) -> String {
        match self {
            GatewayError::Validation(reason) => format!("Invalid request: {}", reason),
            GatewayError::Connection { .. } => {
                "Flow service is temporarily unavailable, please try again later".to_string()
            }
            GatewayError::Timeout { .. } => "Flow service did not respond in time".to_string(),
            GatewayError::ClientRejected { status, message } => {
                let detail = sanitize_detail(message);
                if detail.is_empty() {
                    format!("Flow service rejected the request ({})", status)
                } else {
                    format!("Flow service rejected the request ({}): {}", status, detail)
                }
            }
            GatewayError::UpstreamFailure { .. } | GatewayError::ResponseMalformed(_) => {
                "Flow service encountered an internal error".to_string()
            }
            GatewayError::Configuration(_) => "Flow gateway is misconfigured".to_string(),
        }
    }
}

impl From<UpstreamFailure> for GatewayError {
    fn from(failure: UpstreamFailure) -> Self {
        match failure.kind {
            FailureKind::Timeout => GatewayError::Timeout {
                attempts: 1,
                message: failure.message,
            },
            FailureKind::ConnectionError => GatewayError::Connection {
                attempts: 1,
                message: failure.message,
            },
            FailureKind::HttpError => match failure.status {
                Some(status) if (400..500).contains(&status) => GatewayError::ClientRejected {
                    status,
                    message: failure.message,
                },
                Some(status) => GatewayError::UpstreamFailure {
                    status,
                    message: failure.message,
                },
                None => GatewayError::ResponseMalformed(format!(
                    "HTTP error without status: {}",
                    failure.message
                )),
            },
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::ResponseMalformed(format!("JSON error: {}", err))
    }
}

/// Strip control characters and cap the length of upstream text
fn sanitize_detail(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control() || *c == ' ')
        .take(MAX_CALLER_DETAIL_LEN)
        .collect::<String>()
        .trim()
        .to_string()
}
