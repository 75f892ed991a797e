//! Buffered forwarding: JSON relay and binary passthrough.

use axum::{
    body::{Body, Bytes},
    http::{HeaderValue, Method, Request, Response, header},
};
use futures::StreamExt;
use log::{debug, error};

use super::super::error::{ApiError, ApiResult, ProxyError};
use super::super::state::AppState;
use super::builder::{is_read_only, read_request_body};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Build the upstream request: declared content-type (JSON by default) and,
/// unless the method is read-only, the inbound body verbatim.
pub(super) async fn prepare_upstream_request(
    state: &AppState,
    req: Request<Body>,
    upstream_url: &str,
    method: Method,
) -> ApiResult<reqwest::RequestBuilder> {
    let (parts, body) = req.into_parts();
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(JSON_CONTENT_TYPE));

    let mut builder = state
        .http_client
        .request(method.clone(), upstream_url)
        .header(header::CONTENT_TYPE, content_type);

    if !is_read_only(&method) {
        let bytes = read_request_body(&parts.headers, body, state.proxy.max_request_bytes).await?;
        builder = builder.body(bytes);
    }

    Ok(builder)
}

/// Forward a request and relay the upstream body as buffered text.
pub async fn forward_json(
    state: &AppState,
    req: Request<Body>,
    upstream_url: &str,
    method: Method,
) -> ApiResult<Response<Body>> {
    debug!("Proxying {} {}", method, upstream_url);

    let response = prepare_upstream_request(state, req, upstream_url, method)
        .await?
        .timeout(state.proxy.timeout)
        .send()
        .await
        .map_err(|e| ProxyError::from_reqwest(upstream_url, &e))?;

    relay_buffered(response, upstream_url, state.proxy.max_response_bytes).await
}

/// Forward a request and stream the upstream body back as opaque bytes,
/// preserving `Content-Type` and `Content-Disposition`.
///
/// The deadline covers the response head only. Once the status has been
/// relayed the body streams for as long as the upstream takes.
pub async fn forward_binary(
    state: &AppState,
    req: Request<Body>,
    upstream_url: &str,
    method: Method,
) -> ApiResult<Response<Body>> {
    debug!("Proxying binary {} {}", method, upstream_url);

    let request = prepare_upstream_request(state, req, upstream_url, method).await?;
    let deadline = state.proxy.timeout;
    let response = tokio::time::timeout(deadline, request.send())
        .await
        .map_err(|_| {
            ProxyError::timeout(
                upstream_url,
                format!("response headers not received within {deadline:?}"),
            )
        })?
        .map_err(|e| ProxyError::from_reqwest(upstream_url, &e))?;

    let mut builder = Response::builder().status(response.status());
    for name in [header::CONTENT_TYPE, header::CONTENT_DISPOSITION] {
        if let Some(value) = response.headers().get(&name) {
            builder = builder.header(name, value.clone());
        }
    }

    builder
        .body(Body::from_stream(response.bytes_stream()))
        .map_err(|e| {
            error!("Failed to build binary response: {:?}", e);
            ApiError::internal("failed to build response")
        })
}

/// Read an upstream body to completion, bounded by `max_bytes`, and relay it
/// unparsed with the upstream status.
pub async fn relay_buffered(
    response: reqwest::Response,
    upstream_url: &str,
    max_bytes: usize,
) -> ApiResult<Response<Body>> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(JSON_CONTENT_TYPE));

    if response
        .content_length()
        .is_some_and(|len| len > max_bytes as u64)
    {
        return Err(too_large(upstream_url, max_bytes));
    }

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk: Bytes = chunk.map_err(|e| ProxyError::from_reqwest(upstream_url, &e))?;
        if body.len() + chunk.len() > max_bytes {
            return Err(too_large(upstream_url, max_bytes));
        }
        body.extend_from_slice(&chunk);
    }

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(body))
        .map_err(|e| {
            error!("Failed to build proxy response: {:?}", e);
            ApiError::internal("failed to build response")
        })
}

fn too_large(upstream_url: &str, limit: usize) -> ApiError {
    ProxyError::TooLarge {
        url: upstream_url.to_string(),
        limit,
    }
    .into()
}
