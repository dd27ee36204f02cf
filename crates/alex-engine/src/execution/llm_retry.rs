//! Thin adapter between `alex_llm::retry`/the raw `StreamEvent` stream and
//! the engine's own event emission, grounded on the teacher's
//! `agent/execution/llm_retry.rs`. Rate-limit waits surface as log lines
//! rather than a domain event, since the spec's closed `EventKind` set has
//! no rate-limit variant of its own; streamed deltas are routed live as
//! they arrive (spec §4.5 step 3), which is why this does its own
//! stream-walking instead of calling `alex_llm::aggregate_stream` directly.

use std::collections::BTreeMap;

use alex_events::EventKind;
use alex_llm::{
    call_with_retry, CompletionRequest, CompletionResponse, FinishReason, LlmError, Role as LlmRole, RetryNotice,
    RetryPolicy, StreamEvent, ToolCallRequest,
};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::EngineDeps;

pub(super) async fn complete(
    deps: &EngineDeps,
    request: &CompletionRequest,
    session_id: &str,
    task_id: &str,
    iteration: u32,
    cancel: &CancellationToken,
) -> Result<CompletionResponse, EngineError> {
    let policy = RetryPolicy::default();

    let response = call_with_retry(
        &policy,
        cancel,
        |notice| match notice {
            RetryNotice::Waiting {
                message,
                wait_secs,
                attempt,
                max_attempts,
            } => warn!(session_id, task_id, iteration, attempt, max_attempts, wait_secs, %message, "llm rate limited, backing off"),
            RetryNotice::Resumed { attempt } => {
                info!(session_id, task_id, iteration, attempt, "resuming after rate limit wait")
            }
        },
        || async {
            if deps.llm.supports_streaming() {
                let stream = deps.llm.stream_complete(request).await?;
                drive_stream(deps, stream, session_id, task_id, iteration).await
            } else {
                deps.llm.complete(request).await
            }
        },
    )
    .await?;

    Ok(response)
}

/// Walk a raw `StreamEvent` stream, emitting `thinking`/`assistant_message`
/// deltas as they arrive, and assemble the aggregated response exactly as
/// `alex_llm::aggregate_stream` would (spec §4.5 steps 3-4).
async fn drive_stream(
    deps: &EngineDeps,
    mut stream: std::pin::Pin<Box<dyn futures_util::Stream<Item = Result<StreamEvent, LlmError>> + Send>>,
    session_id: &str,
    task_id: &str,
    iteration: u32,
) -> Result<CompletionResponse, LlmError> {
    let mut text = String::new();
    let mut tool_calls: BTreeMap<usize, ToolCallRequest> = BTreeMap::new();
    let mut pending_args: BTreeMap<usize, (String, String, String)> = BTreeMap::new();
    let mut usage = None;
    let mut finish_reason = FinishReason::Stop;

    while let Some(item) = stream.next().await {
        match item? {
            StreamEvent::TextDelta(delta) => {
                deps.broadcaster
                    .publish(
                        session_id,
                        task_id,
                        Some(iteration),
                        EventKind::AssistantMessage {
                            delta: delta.clone(),
                            is_final: false,
                            source_model: deps.policy.model.clone(),
                        },
                    )
                    .await;
                text.push_str(&delta);
            }
            StreamEvent::ReasoningDelta(delta) => {
                deps.broadcaster
                    .publish(session_id, task_id, Some(iteration), EventKind::Thinking { delta })
                    .await;
            }
            StreamEvent::ToolCallStart { index, id, name } => {
                pending_args.insert(index, (id, name, String::new()));
            }
            StreamEvent::ToolCallArgsDelta { index, partial_json } => {
                if let Some((_, _, buf)) = pending_args.get_mut(&index) {
                    buf.push_str(&partial_json);
                }
            }
            StreamEvent::ToolCallComplete { index, tool_call } => {
                pending_args.remove(&index);
                tool_calls.insert(index, tool_call);
            }
            StreamEvent::Usage(u) => {
                usage = Some(match usage {
                    Some(prev) => merge_usage_max(prev, u),
                    None => u,
                });
            }
            StreamEvent::Done { finish_reason: reason } => {
                finish_reason = reason;
                break;
            }
        }
    }

    for (index, (id, name, json)) in pending_args {
        let arguments = serde_json::from_str(&json).unwrap_or(serde_json::Value::Null);
        tool_calls.insert(index, ToolCallRequest { id, name, arguments });
    }

    let tool_calls: Vec<ToolCallRequest> = tool_calls.into_values().collect();
    let message = alex_llm::ChatMessage {
        role: Some(LlmRole::Assistant),
        content: text,
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        tool_call_id: None,
    };

    Ok(CompletionResponse {
        message,
        finish_reason,
        usage,
    })
}

fn merge_usage_max(a: alex_events::TokenUsage, b: alex_events::TokenUsage) -> alex_events::TokenUsage {
    alex_events::TokenUsage {
        prompt_tokens: a.prompt_tokens.max(b.prompt_tokens),
        completion_tokens: a.completion_tokens.max(b.completion_tokens),
        total_tokens: a.total_tokens.max(b.total_tokens),
    }
}
