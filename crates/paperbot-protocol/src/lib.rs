//! Streaming protocol types for PaperBot workflow feeds.
//!
//! Long-running backend workflows (topic search, daily reports, judging) report
//! progress as a Server-Sent-Events stream:
//!
//! ```text
//! Backend --[text/event-stream]--> Gateway --[relayed bytes]--> Consumer
//!                                                                  |
//!                                                     SseDecoder -> SseMessage
//!                                                                  |
//!                                                  normalize_sse_message -> NormalizedSseEvent
//! ```
//!
//! ## Design Principles
//!
//! 1. **Decoding is chunk-agnostic.** Splitting the byte stream at any point
//!    yields the same messages as delivering it in one piece.
//! 2. **One bad frame never kills a stream.** Malformed payloads surface as a
//!    synthetic error message and decoding continues.
//! 3. **Normalization is total.** Any message maps to a fully populated envelope;
//!    unknown event kinds degrade to `status`.

pub mod events;
pub mod sse;

pub use events::{EventKind, NormalizedSseEvent, StreamEnvelope, normalize_sse_message};
pub use sse::{
    DONE_SENTINEL, INVALID_PAYLOAD_MESSAGE, SseDecoder, SseMessage, SseMessageStream,
    sse_messages,
};
