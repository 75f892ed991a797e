//! Static route table.
//!
//! Each entry maps a gateway path template to the same path under the
//! upstream `/api` prefix, along with the methods it accepts and how the
//! response is relayed.

use std::collections::HashMap;

use axum::{
    body::Body,
    extract::{Path, State, rejection::PathRejection},
    http::{Method, Request, Response},
    routing::{MethodFilter, MethodRouter},
};

use super::super::error::{ApiError, ApiResult};
use super::super::handlers::method_not_allowed;
use super::super::state::AppState;
use super::builder::{build_upstream_url, encode_path_segment, validate_numeric_id};
use super::forward::{forward_binary, forward_json};
use super::sse::forward_stream;

use ParamRule::{Numeric, Segment};
use RelayMode::{Binary, Json, Stream};
use RouteMethod::{Delete, Get, Patch, Post};

/// How an upstream response is relayed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Buffered text with the upstream status and content-type.
    Json,
    /// Opaque byte stream keeping `Content-Type` and `Content-Disposition`.
    Binary,
    /// Live event stream, with a JSON fallback.
    Stream,
}

/// Validation applied to path parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRule {
    /// Any single segment, percent-encoded.
    Segment,
    /// Decimal digits only, forwarded in canonical form.
    Numeric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl RouteMethod {
    pub fn method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Patch => Method::PATCH,
            Self::Delete => Method::DELETE,
        }
    }

    fn filter(self) -> MethodFilter {
        match self {
            Self::Get => MethodFilter::GET,
            Self::Post => MethodFilter::POST,
            Self::Patch => MethodFilter::PATCH,
            Self::Delete => MethodFilter::DELETE,
        }
    }
}

#[derive(Debug)]
pub struct RouteSpec {
    /// Path template, relative to `/api` on both sides.
    pub template: &'static str,
    pub methods: &'static [RouteMethod],
    pub mode: RelayMode,
    pub params: ParamRule,
}

const fn route(
    template: &'static str,
    methods: &'static [RouteMethod],
    mode: RelayMode,
) -> RouteSpec {
    RouteSpec {
        template,
        methods,
        mode,
        params: Segment,
    }
}

pub static ROUTES: &[RouteSpec] = &[
    // Model endpoints
    route("/model-endpoints", &[Get, Post], Json),
    route("/model-endpoints/{endpoint_id}", &[Get, Patch, Delete], Json),
    route("/model-endpoints/{endpoint_id}/test", &[Post], Json),
    // Scholars
    route("/research/scholars", &[Get, Post], Json),
    route("/research/scholars/{scholar_id}", &[Get, Patch, Delete], Json),
    route("/research/scholars/{scholar_id}/papers", &[Get], Json),
    // Papers
    route("/research/papers", &[Get], Json),
    route("/research/papers/export", &[Get], Binary),
    RouteSpec {
        template: "/research/papers/{paper_id}/save",
        methods: &[Post, Delete],
        mode: Json,
        params: Numeric,
    },
    // Tracks
    route("/research/tracks", &[Get, Post], Json),
    route("/research/tracks/{track_id}/feed", &[Get], Json),
    route("/research/tracks/{track_id}/anchors", &[Get, Post], Json),
    route("/research/discovery/seed", &[Post], Json),
    // Newsletter
    route("/newsletter/subscribe", &[Post], Json),
    route("/newsletter/unsubscribe/{token}", &[Get, Post], Json),
    // Long-running workflows
    route("/research/paperscool/search", &[Post], Stream),
    route("/research/paperscool/daily", &[Post], Stream),
    route("/research/paperscool/analyze", &[Post], Stream),
    route("/studio/runs/{run_id}/events", &[Get], Stream),
];

impl RouteSpec {
    pub fn has_params(&self) -> bool {
        self.template.contains('{')
    }

    /// Substitute validated parameters into the template.
    pub fn render_path(&self, params: &HashMap<String, String>) -> ApiResult<String> {
        let mut path = String::with_capacity(self.template.len());
        let mut rest = self.template;

        while let Some(start) = rest.find('{') {
            path.push_str(&rest[..start]);
            let end = rest[start..]
                .find('}')
                .map(|offset| start + offset)
                .ok_or_else(|| ApiError::internal(format!("bad template {}", self.template)))?;
            let name = &rest[start + 1..end];
            let value = params
                .get(name)
                .ok_or_else(|| ApiError::bad_request(format!("missing {name}")))?;
            let segment = match self.params {
                Numeric => validate_numeric_id(name, value)?,
                Segment => encode_path_segment(name, value)?,
            };
            path.push_str(&segment);
            rest = &rest[end + 1..];
        }

        path.push_str(rest);
        Ok(path)
    }

    /// Axum method router dispatching every allowed method to the proxy.
    pub fn method_router(&'static self) -> MethodRouter<AppState> {
        let mut router = MethodRouter::<AppState>::new();
        for method in self.methods {
            router = if self.has_params() {
                router.on(
                    method.filter(),
                    move |State(state): State<AppState>,
                          params: Result<Path<HashMap<String, String>>, PathRejection>,
                          req: Request<Body>| async move {
                        match params {
                            Ok(Path(params)) => proxy_route(self, &state, &params, req).await,
                            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
                        }
                    },
                )
            } else {
                router.on(
                    method.filter(),
                    move |State(state): State<AppState>, req: Request<Body>| async move {
                        proxy_route(self, &state, &HashMap::new(), req).await
                    },
                )
            };
        }
        router.fallback(method_not_allowed)
    }
}

async fn proxy_route(
    spec: &'static RouteSpec,
    state: &AppState,
    params: &HashMap<String, String>,
    req: Request<Body>,
) -> ApiResult<Response<Body>> {
    let path = spec.render_path(params)?;
    let upstream_url = build_upstream_url(&state.upstream_base_url, &path, req.uri().query());
    let method = req.method().clone();

    match spec.mode {
        Json => forward_json(state, req, &upstream_url, method).await,
        Binary => forward_binary(state, req, &upstream_url, method).await,
        Stream => forward_stream(state, req, &upstream_url, method).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::collections::HashSet;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn find(template: &str) -> &'static RouteSpec {
        ROUTES
            .iter()
            .find(|r| r.template == template)
            .expect("route registered")
    }

    #[test]
    fn templates_are_unique_and_rooted() {
        let mut seen = HashSet::new();
        for route in ROUTES {
            assert!(route.template.starts_with('/'), "{}", route.template);
            assert!(seen.insert(route.template), "duplicate {}", route.template);
            assert!(!route.methods.is_empty());
        }
        assert_eq!(ROUTES.len(), 19);
    }

    #[test]
    fn streaming_routes() {
        let streams: Vec<_> = ROUTES
            .iter()
            .filter(|r| r.mode == Stream)
            .map(|r| r.template)
            .collect();
        assert_eq!(
            streams,
            [
                "/research/paperscool/search",
                "/research/paperscool/daily",
                "/research/paperscool/analyze",
                "/studio/runs/{run_id}/events",
            ]
        );
        assert_eq!(find("/research/papers/export").mode, Binary);
    }

    #[test]
    fn render_path_without_params() {
        let path = find("/research/papers").render_path(&HashMap::new()).unwrap();
        assert_eq!(path, "/research/papers");
    }

    #[test]
    fn render_path_encodes_segments() {
        let path = find("/newsletter/unsubscribe/{token}")
            .render_path(&params(&[("token", "a b/c")]))
            .unwrap();
        assert_eq!(path, "/newsletter/unsubscribe/a%20b%2Fc");

        let path = find("/research/tracks/{track_id}/anchors")
            .render_path(&params(&[("track_id", "t-1")]))
            .unwrap();
        assert_eq!(path, "/research/tracks/t-1/anchors");
    }

    #[test]
    fn render_path_validates_numeric_ids() {
        let save = find("/research/papers/{paper_id}/save");
        assert_eq!(
            save.render_path(&params(&[("paper_id", "0042")])).unwrap(),
            "/research/papers/42/save"
        );
        for bad in ["12a", "-5", "abc"] {
            let err = save
                .render_path(&params(&[("paper_id", bad)]))
                .unwrap_err();
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn render_path_requires_every_param() {
        let err = find("/model-endpoints/{endpoint_id}/test")
            .render_path(&HashMap::new())
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
