use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::usage::TokenUsage;

/// Why a tool call, or the whole task, ended the way it did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Ok,
    Error,
    Timeout,
}

/// Stable error identifiers, shared between wire events, logs and the HTTP
/// error envelope. See `ApiError` in `alex-server` for the HTTP mapping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    Unauthorized,
    NotFound,
    RateLimited,
    UpstreamUnavailable,
    ContextLengthExceeded,
    ToolUnknown,
    ToolInvalidArguments,
    ToolTimeout,
    ToolFailed,
    IterationLimit,
    Cancelled,
    EventLag,
    Internal,
}

/// One redacted, serialisable tool-call argument blob.
///
/// Kept as a thin wrapper (rather than a bare `serde_json::Value`) so the
/// redaction pass in [`crate::redact`] has a single, obvious seam to hook.
pub type RedactedArguments = serde_json::Value;

/// The closed set of domain event variants emitted along a task's lifetime.
///
/// Tagged as `event_type` in the wire form, e.g.
/// `{"event_type":"tool_call_start","call_id":"c1",...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    TaskStarted,

    IterationStart,

    /// Incremental reasoning-channel delta, streamed when the provider
    /// exposes one. Never persisted on its own — see `think_complete`.
    Thinking { delta: String },

    ThinkComplete,

    /// Incremental or final assistant text. `final` is `false` for every
    /// streamed delta and `true` exactly once per iteration, carrying the
    /// full aggregated text (possibly empty).
    AssistantMessage {
        delta: String,
        #[serde(rename = "final")]
        is_final: bool,
        source_model: String,
    },

    ToolCallStart {
        call_id: String,
        tool_name: String,
        arguments: RedactedArguments,
    },

    /// Optional in-progress output chunk from a long-running, streaming-capable tool.
    ToolCallStream { call_id: String, chunk: String },

    ToolCallComplete {
        call_id: String,
        result: String,
        duration_ms: u64,
        status: ToolCallStatus,
        #[serde(default)]
        truncated: bool,
    },

    IterationComplete {
        summary: String,
        usage: TokenUsage,
    },

    TaskComplete {
        final_answer: String,
        total_iterations: u32,
        cost_usd: Option<f64>,
    },

    Error {
        kind: ErrorKind,
        message: String,
        recoverable: bool,
    },
}

impl EventKind {
    /// The `event_type` discriminant as it appears on the wire, without
    /// round-tripping through serde — handy for log fields and metrics.
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::TaskStarted => "task_started",
            EventKind::IterationStart => "iteration_start",
            EventKind::Thinking { .. } => "thinking",
            EventKind::ThinkComplete => "think_complete",
            EventKind::AssistantMessage { .. } => "assistant_message",
            EventKind::ToolCallStart { .. } => "tool_call_start",
            EventKind::ToolCallStream { .. } => "tool_call_stream",
            EventKind::ToolCallComplete { .. } => "tool_call_complete",
            EventKind::IterationComplete { .. } => "iteration_complete",
            EventKind::TaskComplete { .. } => "task_complete",
            EventKind::Error { .. } => "error",
        }
    }

    /// Terminal events end the task: no further event may reach a
    /// subscriber for the same task afterwards (invariant 3, spec §8).
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::TaskComplete { .. } | EventKind::Error { .. })
    }
}

/// A single immutable domain event.
///
/// `sequence` is monotonically increasing per session (invariant 2, spec §8)
/// and is assigned by the broadcaster's per-session ingest worker, never by
/// the emitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub sequence: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub session_id: String,
    pub task_id: String,
    pub iteration: Option<u32>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: EventKind) -> Event {
        Event {
            sequence: 1,
            timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
            session_id: "sess-1".into(),
            task_id: "task-1".into(),
            iteration: Some(1),
            kind,
        }
    }

    #[test]
    fn round_trips_through_json() {
        let event = sample(EventKind::ToolCallComplete {
            call_id: "c1".into(),
            result: "ok".into(),
            duration_ms: 12,
            status: ToolCallStatus::Ok,
            truncated: false,
        });
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sequence, event.sequence);
        assert_eq!(back.event_type(), "tool_call_complete");
    }

    #[test]
    fn wire_form_tags_event_type_and_flattens_fields() {
        let event = sample(EventKind::TaskStarted);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "task_started");
        assert_eq!(value["session_id"], "sess-1");
    }

    #[test]
    fn terminal_events_are_task_complete_or_error() {
        assert!(
            sample(EventKind::TaskComplete {
                final_answer: "hi".into(),
                total_iterations: 1,
                cost_usd: None,
            })
            .is_terminal()
        );
        assert!(
            sample(EventKind::Error {
                kind: ErrorKind::IterationLimit,
                message: "stop".into(),
                recoverable: false,
            })
            .is_terminal()
        );
        assert!(!sample(EventKind::IterationStart).is_terminal());
    }
}
