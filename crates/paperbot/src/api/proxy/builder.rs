//! Shared proxy utilities.
//!
//! - Upstream URL construction
//! - Path parameter encoding and validation
//! - Request body limits

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Method, header},
};
use log::{error, warn};

use super::super::error::{ApiError, ApiResult};

// ============================================================================
// Body Limit Enforcement
// ============================================================================

/// Enforce a body size limit based on Content-Length header.
pub fn enforce_proxy_body_limit(headers: &HeaderMap, max_body_bytes: usize) -> ApiResult<()> {
    if let Some(value) = headers.get(header::CONTENT_LENGTH) {
        let length = value
            .to_str()
            .ok()
            .and_then(|raw| raw.parse::<usize>().ok())
            .ok_or_else(|| ApiError::bad_request("invalid Content-Length header"))?;
        if length > max_body_bytes {
            return Err(ApiError::payload_too_large(format!(
                "request body exceeds {max_body_bytes} bytes"
            )));
        }
    }
    Ok(())
}

/// Buffer an inbound body, bounded by `max_body_bytes`.
pub async fn read_request_body(
    headers: &HeaderMap,
    body: Body,
    max_body_bytes: usize,
) -> ApiResult<Bytes> {
    enforce_proxy_body_limit(headers, max_body_bytes)?;
    axum::body::to_bytes(body, max_body_bytes)
        .await
        .map_err(|e| {
            if e.to_string().contains("length limit") {
                warn!(
                    "Proxy request body exceeded limit of {} bytes",
                    max_body_bytes
                );
                return ApiError::payload_too_large(format!(
                    "request body exceeds {max_body_bytes} bytes"
                ));
            }
            error!("Failed to buffer proxy request body: {:?}", e);
            ApiError::bad_request("unable to read request body")
        })
}

/// Methods forwarded without a body.
pub fn is_read_only(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

// ============================================================================
// URL Construction
// ============================================================================

/// `<base>/api<path>[?query]`. The query string is appended verbatim.
pub fn build_upstream_url(base_url: &str, path: &str, query: Option<&str>) -> String {
    let mut url = format!("{}/api{}", base_url.trim_end_matches('/'), path);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// Percent-encode a decoded path parameter as a single segment.
pub fn encode_path_segment(name: &str, value: &str) -> ApiResult<String> {
    if value.is_empty() || value == "." || value == ".." {
        return Err(ApiError::bad_request(format!("invalid {name}: {value:?}")));
    }
    Ok(urlencoding::encode(value).into_owned())
}

/// Accept only non-empty ASCII digits that fit in a `u64`; return the
/// canonical decimal form.
pub fn validate_numeric_id(name: &str, value: &str) -> ApiResult<String> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiError::bad_request(format!("invalid {name}: {value}")));
    }
    value
        .parse::<u64>()
        .map(|id| id.to_string())
        .map_err(|_| ApiError::bad_request(format!("invalid {name}: {value}")))
}
