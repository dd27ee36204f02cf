use alex_events::TokenUsage;
use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, FinishReason, ToolCallRequest};

/// A complete, non-streamed model response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub message: ChatMessage,
    pub finish_reason: FinishReason,
    pub usage: Option<TokenUsage>,
}

/// One increment of a streamed completion. Mirrors the provider-agnostic
/// delta shape the engine assembles into a `CompletionResponse` (spec
/// §4.4, grounded on the teacher's `StreamChunk`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEvent {
    /// Plain text delta.
    TextDelta(String),

    /// Incremental delta on a provider's separate reasoning/thinking
    /// channel, when it exposes one (spec §4.5 step 3). Not every
    /// provider sends these; absence is not an error.
    ReasoningDelta(String),

    /// A tool call block has started; its arguments arrive incrementally
    /// via `ToolCallArgsDelta` and are assembled into a `ToolCallComplete`.
    ToolCallStart { index: usize, id: String, name: String },

    /// Partial JSON for a tool call's arguments.
    ToolCallArgsDelta { index: usize, partial_json: String },

    /// A tool call's arguments are fully assembled and parsed.
    ToolCallComplete {
        index: usize,
        tool_call: ToolCallRequest,
    },

    /// Token usage, possibly arriving more than once across a stream —
    /// callers should take the field-wise maximum across occurrences.
    Usage(TokenUsage),

    /// The stream has ended.
    Done { finish_reason: FinishReason },
}
