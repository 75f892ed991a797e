//! Shared harness: a stub research backend and gateway builders.

#![allow(dead_code)]

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Response, StatusCode, Uri, header},
};
use futures::StreamExt;
use serde_json::json;
use tokio::net::TcpListener;

use paperbot::api::{AppState, ProxySettings, create_app};

/// Exact body served for `GET /api/research/papers`.
pub const PAPERS_BODY: &str = r#"{"items":[1.10,2],"total":2}"#;

pub const EXPORT_BODY: &str = "id,title\n1,Attention Is All You Need\n";

/// Event stream served for `POST /api/research/paperscool/search`.
pub const SEARCH_EVENTS: &str = concat!(
    ": keep-alive\n\n",
    "data: {\"type\":\"progress\",\"event\":\"search_done\",\"data\":{\"phase\":\"search\",\"count\":3},",
    "\"envelope\":{\"workflow\":\"topic_search\",\"run_id\":\"run-1\",\"seq\":1}}\n\n",
    "data: not json\n\n",
    "data: {\"type\":\"result\",\"data\":{\"items\":[\"Attention\"]}}\r\n\r\n",
    "data: [DONE]\n\n",
    "data: {\"type\":\"status\",\"message\":\"after done\"}\n\n",
);

/// Serve `router` on an ephemeral loopback port and return its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Stub backend; unknown paths echo the request they received.
pub async fn spawn_upstream() -> String {
    spawn(Router::new().fallback(upstream)).await
}

/// Backend that accepts connections but answers after `delay`.
pub async fn spawn_slow_upstream(delay: Duration) -> String {
    spawn(Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        "{}"
    }))
    .await
}

/// Backend that sends its headers and `head` at once, then `tail` after `gap`.
pub async fn spawn_stalling_upstream(
    content_type: &'static str,
    head: &'static str,
    tail: &'static str,
    gap: Duration,
) -> String {
    spawn(Router::new().fallback(move || async move {
        let chunks = futures::stream::iter([(head, Duration::ZERO), (tail, gap)]).then(
            |(chunk, pause)| async move {
                tokio::time::sleep(pause).await;
                Ok::<_, Infallible>(Bytes::from_static(chunk.as_bytes()))
            },
        );
        Response::builder()
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from_stream(chunks))
            .unwrap()
    }))
    .await
}

/// A loopback URL with nothing listening on it.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn test_gateway(upstream: &str, settings: ProxySettings) -> Router {
    create_app(AppState::new(upstream, settings, Vec::new()).unwrap())
}

pub fn fast_settings() -> ProxySettings {
    ProxySettings {
        timeout: Duration::from_millis(300),
        connect_timeout: Duration::from_millis(300),
        ..ProxySettings::default()
    }
}

async fn upstream(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response<Body> {
    match (method.as_str(), uri.path()) {
        ("GET", "/api/research/papers") => json_response(StatusCode::OK, PAPERS_BODY),
        ("GET", "/api/research/papers/export") => Response::builder()
            .header(header::CONTENT_TYPE, "text/csv")
            .header(
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"papers.csv\"",
            )
            .body(Body::from(EXPORT_BODY))
            .unwrap(),
        ("GET", "/api/research/scholars/missing") => {
            json_response(StatusCode::NOT_FOUND, r#"{"detail":"Scholar not found"}"#)
        }
        ("POST", "/api/research/paperscool/search") => event_stream(SEARCH_EVENTS),
        ("POST", "/api/research/paperscool/daily") => {
            json_response(StatusCode::OK, r#"{"report":"ready"}"#)
        }
        _ => {
            let header_str = |name: header::HeaderName| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let echo = json!({
                "method": method.as_str(),
                "path_and_query": uri.path_and_query().map(|p| p.as_str()),
                "content_type": header_str(header::CONTENT_TYPE),
                "accept": header_str(header::ACCEPT),
                "body": String::from_utf8_lossy(&body),
            });
            json_response(StatusCode::OK, &echo.to_string())
        }
    }
}

fn json_response(status: StatusCode, body: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Serve `payload` in small chunks that cut across frame boundaries.
fn event_stream(payload: &'static str) -> Response<Body> {
    let chunks: Vec<Result<Bytes, Infallible>> = payload
        .as_bytes()
        .chunks(7)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(futures::stream::iter(chunks)))
        .unwrap()
}
