//! Error responses for the Flowgate API

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use flowgate_core::{ErrorKind, GatewayError};

/// API error returned by handlers
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

/// HTTP status for a gateway error classification
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::ConnectionError => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::ClientRejected | ErrorKind::UpstreamFailure | ErrorKind::ResponseMalformed => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::ConfigurationError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let kind = self.0.kind();
        let message = self.0.caller_message();

        let body = Json(json!({
            "error": message,
            "errorDetails": {
                "errorCode": kind.code(),
                "errorMessage": message,
            }
        }));

        (status_for(kind), body).into_response()
    }
}
