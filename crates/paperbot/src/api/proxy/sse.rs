//! Server-Sent Events (SSE) proxy.
//!
//! Relays long-running workflow streams without buffering. Only connection
//! establishment is bounded; once connected, the stream may idle for as long
//! as the upstream keeps it open.

use axum::{
    body::{Body, Bytes},
    http::{Method, Request, Response, StatusCode, header},
};
use log::{debug, error};

use super::super::error::{ApiError, ApiResult, ProxyError};
use super::super::state::AppState;
use super::forward::{prepare_upstream_request, relay_buffered};

const EVENT_STREAM: &str = "text/event-stream";

// ============================================================================
// SSE Response Builder
// ============================================================================

/// Build an SSE response from a reqwest response stream.
fn build_sse_response(
    status: StatusCode,
    stream: impl futures::Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> ApiResult<Response<Body>> {
    let body = Body::from_stream(stream);

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, EVENT_STREAM)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no") // Disable nginx buffering if present
        .body(body)
        .map_err(|e| {
            error!("Failed to build SSE response: {:?}", e);
            ApiError::internal("failed to build SSE response")
        })
}

/// Whether the upstream answered with an event stream.
pub fn is_event_stream(headers: &reqwest::header::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .trim_start()
                .to_ascii_lowercase()
                .starts_with(EVENT_STREAM)
        })
}

/// Forward a request to a streaming endpoint.
///
/// An event-stream answer is relayed live. Anything else is the fast path:
/// the upstream finished without streaming, so the body is buffered and
/// relayed as ordinary JSON under the normal deadline.
pub async fn forward_stream(
    state: &AppState,
    req: Request<Body>,
    upstream_url: &str,
    method: Method,
) -> ApiResult<Response<Body>> {
    debug!("Proxying stream {} {}", method, upstream_url);

    let response = prepare_upstream_request(state, req, upstream_url, method)
        .await?
        .header(header::ACCEPT, EVENT_STREAM)
        .send()
        .await
        .map_err(|e| ProxyError::from_reqwest(upstream_url, &e))?;

    if is_event_stream(response.headers()) {
        return build_sse_response(response.status(), response.bytes_stream());
    }

    debug!(
        "Upstream answered {} without an event stream, relaying as JSON",
        upstream_url
    );
    let deadline = state.proxy.timeout;
    tokio::time::timeout(
        deadline,
        relay_buffered(response, upstream_url, state.proxy.max_response_bytes),
    )
    .await
    .map_err(|_| {
        ProxyError::timeout(
            upstream_url,
            format!("response body not received within {deadline:?}"),
        )
    })?
}
