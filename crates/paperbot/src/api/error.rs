//! Unified API error handling with structured responses.
//!
//! Every error body has the shape `{detail, error}`. For upstream failures
//! `error` carries the underlying transport error; for local failures it
//! carries a stable error code.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

/// Failure to obtain a usable response from the upstream API.
///
/// Always surfaces to the caller as 502 Bad Gateway.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Upstream API timed out: {url}")]
    Timeout { url: String, reason: String },

    #[error("Upstream API unreachable: {url}")]
    Unreachable { url: String, reason: String },

    #[error("Upstream API response too large: {url}")]
    TooLarge { url: String, limit: usize },
}

impl ProxyError {
    /// Classify a client error: deadline expiry versus everything else.
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        let reason = error_chain(err);
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
                reason,
            }
        } else {
            Self::Unreachable {
                url: url.to_string(),
                reason,
            }
        }
    }

    pub fn timeout(url: &str, reason: impl Into<String>) -> Self {
        Self::Timeout {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// The underlying error string reported in the `error` field.
    pub fn reason(&self) -> String {
        match self {
            Self::Timeout { reason, .. } | Self::Unreachable { reason, .. } => reason.clone(),
            Self::TooLarge { limit, .. } => format!("response body exceeded {limit} bytes"),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Render an error and its sources as one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// API error type with structured responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Upstream(#[from] ProxyError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn method_not_allowed(msg: impl Into<String>) -> Self {
        Self::MethodNotAllowed(msg.into())
    }

    pub fn payload_too_large(msg: impl Into<String>) -> Self {
        Self::PayloadTooLarge(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Upstream(_) => "BAD_GATEWAY",
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            Self::Upstream(err) => ErrorResponse {
                detail: err.to_string(),
                error: err.reason(),
            },
            other => ErrorResponse {
                detail: other.to_string(),
                error: other.error_code().to_string(),
            },
        }
    }
}

/// Structured error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let body = self.body();

        match &self {
            ApiError::Upstream(err) => {
                error!(error_code = code, detail = %body.detail, error = %body.error, "Upstream error");
                if err.is_timeout() {
                    warn!(detail = %body.detail, "Upstream deadline exceeded");
                }
            }
            ApiError::Internal(msg) => {
                error!(error_code = code, message = %msg, "API error");
            }
            _ => {
                tracing::debug!(error_code = code, message = %body.detail, "Client error");
            }
        }

        (status, Json(body)).into_response()
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_status_codes() {
        assert_eq!(ApiError::not_found("").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::bad_request("").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::method_not_allowed("").status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ApiError::payload_too_large("").status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::internal("").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(ProxyError::timeout("http://x", "slow")).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_timeout_detail_mentions_timed_out() {
        let err = ProxyError::timeout("http://up/api/a", "operation timed out");
        assert_eq!(err.to_string(), "Upstream API timed out: http://up/api/a");
        assert_eq!(err.reason(), "operation timed out");
    }

    #[test]
    fn test_unreachable_detail_does_not_mention_timeout() {
        let err = ProxyError::Unreachable {
            url: "http://up/api/a".to_string(),
            reason: "connection refused".to_string(),
        };
        let body = ApiError::from(err).body();
        assert_eq!(body.detail, "Upstream API unreachable: http://up/api/a");
        assert!(!body.detail.contains("timed out"));
        assert_eq!(body.error, "connection refused");
    }

    #[test]
    fn test_local_errors_carry_code() {
        let body = ApiError::bad_request("invalid paper id: 12a").body();
        assert_eq!(body.detail, "Bad request: invalid paper id: 12a");
        assert_eq!(body.error, "BAD_REQUEST");
    }

    #[test]
    fn test_error_chain_joins_sources() {
        #[derive(Debug, Error)]
        #[error("error sending request")]
        struct SendError(#[source] std::io::Error);

        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(
            error_chain(&SendError(inner)),
            "error sending request: refused"
        );
    }
}
