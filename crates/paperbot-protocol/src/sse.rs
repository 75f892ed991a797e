//! Server-Sent Events decoding.
//!
//! Turns a raw `text/event-stream` byte stream into an ordered sequence of
//! [`SseMessage`]s. Only `data:` lines carry messages; every such line is parsed
//! as one JSON value.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::Stream;
use log::debug;
use serde::Serialize;
use serde_json::{Map, Value};

/// Payload that ends a stream before the transport closes.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Message text attached to the synthetic error emitted for unparseable payloads.
pub const INVALID_PAYLOAD_MESSAGE: &str = "Invalid SSE payload";

// ============================================================================
// Message
// ============================================================================

/// One JSON message decoded from a `data:` line.
///
/// The backend's message shape is loose, so every known field is optional and
/// anything else is kept in `extra`. Build it with [`SseMessage::from_value`],
/// which accepts any JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SseMessage {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Raw routing metadata, interpreted by [`crate::normalize_sse_message`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<Map<String, Value>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SseMessage {
    /// Build a message from any JSON value.
    ///
    /// Known fields are lifted out only when they have the expected JSON type;
    /// otherwise they stay in `extra`. A non-object value becomes `data`.
    pub fn from_value(value: Value) -> Self {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Self {
                    data: Some(other),
                    ..Self::default()
                };
            }
        };

        let kind = take_string(&mut map, "type");
        let event = take_string(&mut map, "event");
        let message = take_string(&mut map, "message");
        let envelope = match map.get("envelope") {
            Some(Value::Object(_)) => match map.remove("envelope") {
                Some(Value::Object(envelope)) => Some(envelope),
                _ => None,
            },
            _ => None,
        };
        let data = map.remove("data");

        Self {
            kind,
            event,
            data,
            message,
            envelope,
            extra: map,
        }
    }

    /// The synthetic message emitted in place of a malformed payload.
    pub fn invalid_payload() -> Self {
        Self {
            kind: Some("error".to_string()),
            message: Some(INVALID_PAYLOAD_MESSAGE.to_string()),
            ..Self::default()
        }
    }

    pub fn with_kind(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: Some(kind.into()),
            data: Some(data),
            ..Self::default()
        }
    }
}

impl From<Value> for SseMessage {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    if !matches!(map.get(key), Some(Value::String(_))) {
        return None;
    }
    match map.remove(key) {
        Some(Value::String(value)) => Some(value),
        _ => None,
    }
}

// ============================================================================
// Frame decoder
// ============================================================================

/// Incremental SSE frame decoder.
///
/// Bytes are buffered until a blank line closes a frame, so chunk boundaries
/// (including ones that split a UTF-8 sequence) never change the output.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    /// Offset below which `buf` is known to hold no delimiter.
    scanned: usize,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the `[DONE]` sentinel has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one chunk and return every message completed by it.
    ///
    /// After the sentinel, the rest of the buffer and all later chunks are ignored.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        let mut messages = Vec::new();
        if self.finished {
            return messages;
        }

        self.buf.extend_from_slice(chunk);
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf, self.scanned) {
            let frame: Vec<u8> = self.buf.drain(..idx + delim_len).take(idx).collect();
            self.scanned = 0;
            if decode_frame(&frame, &mut messages) {
                self.finished = true;
                self.buf.clear();
                return messages;
            }
        }
        // A delimiter may straddle the next chunk boundary.
        self.scanned = self.buf.len().saturating_sub(3);
        messages
    }

    /// Discard any unterminated trailing frame. Returns the number of bytes dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buf.len();
        self.buf.clear();
        self.scanned = 0;
        dropped
    }
}

/// Find the earliest blank-line delimiter at or after `from`. `\r\n\r\n`
/// counts the same as `\n\n`.
fn find_frame_delimiter(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..buf.len()).find_map(|i| {
        let rest = &buf[i..];
        if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else {
            None
        }
    })
}

/// Decode one frame into `out`. Returns true when the sentinel was reached.
fn decode_frame(frame: &[u8], out: &mut Vec<SseMessage>) -> bool {
    let text = String::from_utf8_lossy(frame);
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        let Some(payload) = line.strip_prefix("data:") else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            continue;
        }
        if payload == DONE_SENTINEL {
            return true;
        }
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => out.push(SseMessage::from_value(value)),
            Err(err) => {
                debug!("Invalid SSE payload ({}): {}", err, payload);
                out.push(SseMessage::invalid_payload());
            }
        }
    }
    false
}

// ============================================================================
// Message stream
// ============================================================================

/// Lazy stream of decoded messages over a byte stream.
///
/// Reads from the underlying stream only when polled. The byte stream is
/// dropped as soon as the sequence ends (sentinel, transport close or
/// transport error) or when this stream itself is dropped.
pub struct SseMessageStream<S> {
    inner: Option<Pin<Box<S>>>,
    decoder: SseDecoder,
    pending: VecDeque<SseMessage>,
}

/// Decode `stream` into SSE messages.
pub fn sse_messages<S>(stream: S) -> SseMessageStream<S> {
    SseMessageStream {
        inner: Some(Box::pin(stream)),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
    }
}

impl<S, B, E> Stream for SseMessageStream<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    type Item = Result<SseMessage, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(message) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(message)));
            }
            if this.decoder.is_finished() {
                this.inner = None;
                return Poll::Ready(None);
            }
            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };

            match ready!(inner.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => {
                    let messages = this.decoder.push_chunk(chunk.as_ref());
                    this.pending.extend(messages);
                }
                Some(Err(err)) => {
                    this.inner = None;
                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    this.inner = None;
                    let dropped = this.decoder.finish();
                    if dropped > 0 {
                        debug!("SSE stream closed with {} unterminated bytes", dropped);
                    }
                    return Poll::Ready(None);
                }
            }
        }
    }
}
