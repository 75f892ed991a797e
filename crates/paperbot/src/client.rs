//! HTTP client for the gateway.
//!
//! Used by `paperbotctl` and the integration tests to consume workflow
//! streams as normalized events.

use anyhow::{Context, Result, bail};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde_json::Value;

use paperbot_protocol::{NormalizedSseEvent, SseMessage, normalize_sse_message, sse_messages};

use crate::api::ErrorResponse;
use crate::api::proxy::is_event_stream;

/// Normalized events from one workflow stream, in upstream order.
pub type EventStream = BoxStream<'static, Result<NormalizedSseEvent>>;

pub struct GatewayClient {
    base_url: String,
    client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .get(&url)
            .send()
            .await
            .context("sending request to gateway")
    }

    /// Open a workflow stream and decode it into normalized events.
    ///
    /// With a body the request is a JSON POST, otherwise a GET. A plain JSON
    /// answer (no computation was needed upstream) arrives as a single
    /// `result` event.
    pub async fn stream_events(
        &self,
        path: &str,
        body: Option<&Value>,
        workflow: &str,
    ) -> Result<EventStream> {
        let url = format!("{}{}", self.base_url, path);
        let request = match body {
            Some(body) => self.client.post(&url).json(body),
            None => self.client.get(&url),
        };

        let response = request
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .context("sending request to gateway")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&text)
                .map(|err| err.detail)
                .unwrap_or(text);
            bail!("Request failed ({}): {}", status, detail);
        }

        let workflow = workflow.to_string();

        if is_event_stream(response.headers()) {
            let events = sse_messages(response.bytes_stream()).map(move |item| {
                item.map(|message| normalize_sse_message(&message, &workflow))
                    .map_err(anyhow::Error::from)
            });
            return Ok(events.boxed());
        }

        let body: Value = response.json().await.context("decoding JSON response")?;
        let event = normalize_sse_message(&SseMessage::with_kind("result", body), &workflow);
        Ok(stream::once(async move { Ok(event) }).boxed())
    }
}
