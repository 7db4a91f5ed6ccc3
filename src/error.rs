//! Error types for tierroute.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::guard::Rejection;
use crate::llm::LlmError;
use crate::router::ModelTier;

/// Response header carrying the request's correlation ID.
pub const REQUEST_ID_HEADER: &str = "x-tierroute-request-id";

/// Result type alias for tierroute operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tierroute.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("{0}")]
    Validation(#[from] Rejection),

    #[error("Generation on {tier} tier ({model}) failed: {source}")]
    Generation {
        tier: ModelTier,
        model: String,
        #[source]
        source: LlmError,
    },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Generation { .. } => StatusCode::BAD_GATEWAY,
            Error::Config(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::BadRequest(_) => "invalid_request",
            Error::Generation { .. } => "generation_error",
            Error::Config(_) | Error::Internal(_) => "internal_error",
        }
    }

    /// Message safe to show a client. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Error::Config(_) | Error::Internal(_) => {
                "An unexpected error occurred.".to_string()
            }
            Error::Generation { tier, .. } => {
                format!("The {} tier model failed to generate a response.", tier)
            }
            other => other.to_string(),
        }
    }
}

/// An error bound to the request it failed.
#[derive(Debug)]
pub struct RequestError {
    pub error: Error,
    pub correlation_id: String,
}

impl RequestError {
    pub fn new(error: impl Into<Error>, correlation_id: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            correlation_id: correlation_id.into(),
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status = self.error.status();

        if status.is_server_error() {
            tracing::error!(
                correlation_id = %self.correlation_id,
                error = %self.error,
                status = status.as_u16(),
                "Request failed"
            );
        }

        let mut body = error_body(&self.error, status);
        body["correlation_id"] = serde_json::Value::String(self.correlation_id.clone());

        let mut response = (status, axum::Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&self.correlation_id) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        response
    }
}

fn error_body(error: &Error, status: StatusCode) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "message": error.public_message(),
            "type": error.kind(),
            "code": status.as_u16()
        }
    })
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, axum::Json(error_body(&self, status))).into_response()
    }
}
