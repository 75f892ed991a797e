//! Local (non-proxied) handlers.

use axum::{
    Json,
    http::{Method, Uri},
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Fallback for paths outside the route table.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(uri.path().to_string())
}

/// Fallback for table routes hit with a method they do not accept.
pub async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    ApiError::method_not_allowed(format!("{} {}", method, uri.path()))
}
