//! Canonical stream events.
//!
//! Every decoded [`SseMessage`] is mapped onto a [`NormalizedSseEvent`], the only
//! shape consumers render. Events are derived, never mutated, and never stored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::sse::SseMessage;

/// Event names that report intermediate workflow progress.
const PROGRESS_EVENTS: &[&str] = &[
    "progress",
    "search_done",
    "report_built",
    "llm_summary",
    "llm_done",
    "trend",
    "insight",
    "judge",
    "judge_done",
    "filter_done",
];

// ============================================================================
// Event kind
// ============================================================================

/// Coarse classification of a stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Status,
    Progress,
    Tool,
    Result,
    Error,
    Done,
}

impl EventKind {
    /// Classify a declared event name. Unknown names map to `Status`.
    pub fn classify(name: Option<&str>) -> Self {
        let Some(name) = name else {
            return Self::Status;
        };
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "status" => Self::Status,
            "result" => Self::Result,
            "error" => Self::Error,
            "done" => Self::Done,
            other if other.starts_with("tool") => Self::Tool,
            other if PROGRESS_EVENTS.contains(&other) => Self::Progress,
            _ => Self::Status,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Progress => "progress",
            Self::Tool => "tool",
            Self::Result => "result",
            Self::Error => "error",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Routing metadata attached to every normalized event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEnvelope {
    /// Logical workflow the event belongs to. Never empty of a value.
    pub workflow: String,
    pub run_id: Option<String>,
    pub trace_id: Option<String>,
    pub seq: Option<u64>,
    pub phase: Option<String>,
    /// The event name as declared upstream, or the classification when none was sent.
    pub event: String,
    pub ts: Option<String>,
}

/// A stream event in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSseEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub event: EventKind,
    pub data: Value,
    pub message: Option<String>,
    pub envelope: StreamEnvelope,
}

impl NormalizedSseEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self.event, EventKind::Done)
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Map a loosely shaped message onto the canonical event shape.
///
/// `fallback_workflow` is used when neither the envelope nor the message names
/// a workflow. Total: any message yields a fully populated event.
pub fn normalize_sse_message(message: &SseMessage, fallback_workflow: &str) -> NormalizedSseEvent {
    let envelope = message.envelope.as_ref();
    let from_envelope = |key: &str| envelope.and_then(|env| env.get(key));
    let from_message = |key: &str| message.extra.get(key);

    let declared = message
        .event
        .as_deref()
        .or_else(|| from_envelope("event").and_then(Value::as_str))
        .or(message.kind.as_deref());
    let event = EventKind::classify(declared);

    let workflow = from_envelope("workflow")
        .or_else(|| from_message("workflow"))
        .and_then(non_empty_str)
        .unwrap_or(fallback_workflow)
        .to_string();

    let phase = from_envelope("phase")
        .and_then(scalar_string)
        .or_else(|| data_phase(message.data.as_ref()));

    let lookup = |key: &str| from_envelope(key).or_else(|| from_message(key));

    NormalizedSseEvent {
        kind: message
            .kind
            .clone()
            .or_else(|| declared.map(str::to_string))
            .unwrap_or_else(|| event.as_str().to_string()),
        event,
        data: message.data.clone().unwrap_or(Value::Null),
        message: message.message.clone(),
        envelope: StreamEnvelope {
            workflow,
            run_id: lookup("run_id").and_then(scalar_string),
            trace_id: lookup("trace_id").and_then(scalar_string),
            seq: lookup("seq").and_then(as_seq),
            phase,
            event: declared
                .map(str::to_string)
                .unwrap_or_else(|| event.as_str().to_string()),
            ts: lookup("ts").and_then(scalar_string),
        },
    }
}

fn data_phase(data: Option<&Value>) -> Option<String> {
    data.and_then(Value::as_object)
        .and_then(|obj: &Map<String, Value>| obj.get("phase"))
        .and_then(scalar_string)
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

/// Strings pass through; numbers and booleans are rendered.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_seq(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(value: Value) -> NormalizedSseEvent {
        normalize_sse_message(&SseMessage::from_value(value), "wf1")
    }

    #[test]
    fn classifies_known_progress_events() {
        for name in PROGRESS_EVENTS {
            assert_eq!(normalize(json!({"event": name})).event, EventKind::Progress);
        }
    }

    #[test]
    fn classifies_tool_prefix() {
        assert_eq!(normalize(json!({"event": "toolcall"})).event, EventKind::Tool);
        assert_eq!(normalize(json!({"event": "tool_result"})).event, EventKind::Tool);
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(normalize(json!({"event": "RESULT"})).event, EventKind::Result);
        assert_eq!(normalize(json!({"event": "Judge_Done"})).event, EventKind::Progress);
        assert_eq!(normalize(json!({"event": "ToolCall"})).event, EventKind::Tool);
    }

    #[test]
    fn exact_matches_win() {
        assert_eq!(normalize(json!({"event": "status"})).event, EventKind::Status);
        assert_eq!(normalize(json!({"event": "error"})).event, EventKind::Error);
        assert_eq!(normalize(json!({"event": "done"})).event, EventKind::Done);
        assert_eq!(normalize(json!({"event": "result"})).event, EventKind::Result);
    }

    #[test]
    fn unknown_and_missing_events_default_to_status() {
        assert_eq!(normalize(json!({"event": "mystery"})).event, EventKind::Status);

        let empty = normalize(json!({}));
        assert_eq!(empty.event, EventKind::Status);
        assert_eq!(empty.envelope.workflow, "wf1");
        assert_eq!(empty.kind, "status");
        assert_eq!(empty.envelope.event, "status");
        assert_eq!(empty.envelope.phase, None);
        assert_eq!(empty.data, Value::Null);
    }

    #[test]
    fn declared_event_precedence() {
        let event = normalize(json!({
            "type": "error",
            "envelope": {"event": "judge_done"}
        }));
        assert_eq!(event.event, EventKind::Progress);
        assert_eq!(event.kind, "error");

        let event = normalize(json!({
            "type": "error",
            "event": "done",
            "envelope": {"event": "judge_done"}
        }));
        assert_eq!(event.event, EventKind::Done);

        assert_eq!(normalize(json!({"type": "result"})).event, EventKind::Result);
    }

    #[test]
    fn synthetic_invalid_payload_is_an_error_event() {
        let event = normalize_sse_message(&SseMessage::invalid_payload(), "wf1");
        assert_eq!(event.event, EventKind::Error);
        assert_eq!(event.message.as_deref(), Some("Invalid SSE payload"));
    }

    #[test]
    fn envelope_fields_are_carried() {
        let event = normalize(json!({
            "type": "progress",
            "data": {"phase": "ignored"},
            "envelope": {
                "workflow": "daily_report",
                "run_id": "run-9",
                "trace_id": "t-1",
                "seq": 4,
                "phase": "judge",
                "event": "judge",
                "ts": "2026-01-01T00:00:00Z"
            }
        }));
        assert_eq!(
            event.envelope,
            StreamEnvelope {
                workflow: "daily_report".to_string(),
                run_id: Some("run-9".to_string()),
                trace_id: Some("t-1".to_string()),
                seq: Some(4),
                phase: Some("judge".to_string()),
                event: "judge".to_string(),
                ts: Some("2026-01-01T00:00:00Z".to_string()),
            }
        );
    }

    #[test]
    fn phase_falls_back_to_data() {
        let event = normalize(json!({"event": "progress", "data": {"phase": "search"}}));
        assert_eq!(event.envelope.phase.as_deref(), Some("search"));

        let event = normalize(json!({"event": "progress", "data": ["phase"]}));
        assert_eq!(event.envelope.phase, None);
    }

    #[test]
    fn workflow_prefers_message_over_fallback() {
        let event = normalize(json!({"workflow": "topic_search"}));
        assert_eq!(event.envelope.workflow, "topic_search");

        let event = normalize(json!({"envelope": {"workflow": ""}}));
        assert_eq!(event.envelope.workflow, "wf1");
    }

    #[test]
    fn top_level_routing_fields_are_used_without_envelope() {
        let event = normalize(json!({"event": "trend", "run_id": "r", "seq": "12", "ts": 1700000000}));
        assert_eq!(event.envelope.run_id.as_deref(), Some("r"));
        assert_eq!(event.envelope.seq, Some(12));
        assert_eq!(event.envelope.ts.as_deref(), Some("1700000000"));
    }

    #[test]
    fn serializes_with_snake_case_kind() {
        let value = serde_json::to_value(normalize(json!({"event": "toolcall"}))).unwrap();
        assert_eq!(value["event"], "tool");
        assert_eq!(value["type"], "toolcall");
        assert_eq!(value["envelope"]["workflow"], "wf1");
    }
}
