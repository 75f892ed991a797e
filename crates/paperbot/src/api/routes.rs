//! API route definitions.

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, routing::get};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::proxy::ROUTES;
use super::state::AppState;

/// Create the API router (paths relative to `/api`).
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);
    let max_body_size = state.proxy.max_request_bytes;

    // Tracing layer with request IDs and timing
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let mut router = Router::new().route("/health", get(handlers::health));
    for spec in ROUTES {
        router = router.route(spec.template, spec.method_router());
    }

    router
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(cors)
        .layer(trace_layer)
}

/// Full application: the API router nested under `/api`.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .nest("/api", create_router(state))
        .fallback(handlers::not_found)
}

/// Build the CORS layer from the configured origins.
///
/// With no configured origins any origin is allowed.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [header::CONTENT_TYPE, header::ACCEPT];

    let allow_origin = if state.allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = state
            .allowed_origins
            .iter()
            .filter_map(|origin| {
                origin.parse::<HeaderValue>().ok().or_else(|| {
                    tracing::warn!("CORS: Invalid origin in config: {}", origin);
                    None
                })
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ProxySettings;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        // Nothing listens on port 9 in the test environment; these tests never reach it.
        AppState::new("http://127.0.0.1:9", ProxySettings::default(), Vec::new()).unwrap()
    }

    #[tokio::test]
    async fn health_is_served_locally() {
        let app = create_app(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn unknown_paths_return_json_404() {
        for uri in ["/api/not-a-route", "/elsewhere"] {
            let response = create_app(test_state())
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");

            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(value["error"], "NOT_FOUND");
        }
    }

    #[tokio::test]
    async fn invalid_numeric_id_is_rejected_before_forwarding() {
        let response = create_app(test_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/research/papers/12a/save")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn wrong_method_on_table_route_returns_json_405() {
        let response = create_app(test_state())
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/research/papers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "METHOD_NOT_ALLOWED");
        assert!(value["detail"].as_str().unwrap().contains("DELETE"));
    }

    #[tokio::test]
    async fn undecodable_path_param_returns_json_400() {
        let response = create_app(test_state())
            .oneshot(
                Request::builder()
                    .uri("/api/newsletter/unsubscribe/%FF")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "BAD_REQUEST");
    }
}
