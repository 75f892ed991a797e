//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::{AppConfig, ProxyConfig};

/// Forwarding limits and deadlines.
#[derive(Clone, Debug)]
pub struct ProxySettings {
    /// Deadline for buffered (JSON and binary) upstream calls.
    pub timeout: Duration,
    /// Connection deadline. Streams get no other.
    pub connect_timeout: Duration,
    pub max_request_bytes: usize,
    pub max_response_bytes: usize,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self::from(&ProxyConfig::default())
    }
}

impl From<&ProxyConfig> for ProxySettings {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            timeout: config.timeout(),
            connect_timeout: config.connect_timeout(),
            max_request_bytes: config.max_request_bytes,
            max_response_bytes: config.max_response_bytes,
        }
    }
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Upstream base URL, without trailing slash.
    pub upstream_base_url: Arc<str>,
    /// Pooled client for every upstream call. Deadlines are set per request.
    pub http_client: reqwest::Client,
    pub proxy: ProxySettings,
    /// Allowed CORS origins. Empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(
        upstream_base_url: impl AsRef<str>,
        proxy: ProxySettings,
        allowed_origins: Vec<String>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(proxy.connect_timeout)
            .build()
            .context("building upstream HTTP client")?;

        Ok(Self {
            upstream_base_url: Arc::from(upstream_base_url.as_ref().trim_end_matches('/')),
            http_client,
            proxy,
            allowed_origins,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            &config.upstream.base_url,
            ProxySettings::from(&config.proxy),
            config.server.allowed_origins.clone(),
        )
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("upstream_base_url", &self.upstream_base_url)
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}
