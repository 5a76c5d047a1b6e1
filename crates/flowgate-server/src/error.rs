//! Error types for the Flowgate server

use thiserror::Error;

use flowgate_core::GatewayError;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Gateway could not be built or failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Binding or serving failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;
