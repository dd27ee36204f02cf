//! Core execution logic for the ReAct engine (component C5, spec §4.5).
//!
//! Split across focused submodules, directly modeled on the teacher's
//! `agent/execution/` layout:
//!
//! - `mod` (this file) — `ExecutionState` and the main loop
//! - `transitions` — `BeforeLlmCall`/`CallLlm`/`AfterLlm` state transitions
//! - `tool_calls` — tool execution and result-to-message conversion
//! - `llm_retry` — thin adapter over `alex_llm::retry`
//! - `maintenance` — mid-loop compaction checks

mod llm_retry;
mod maintenance;
#[cfg(test)]
mod tests;
mod tool_calls;
mod transitions;

use std::sync::Arc;
use std::time::Instant;

use alex_events::{EventKind, ToolCallStatus};
use alex_llm::{ChatMessage as LlmMessage, CompletionResponse, LlmPort, Role as LlmRole};
use alex_session::domain::{Message, Role as SessionRole, ToolMessageStatus};
use alex_session::store::SessionStore;
use alex_tools::ToolRegistry;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::broadcaster::Broadcaster;
use crate::error::EngineError;
use crate::policy::EnginePolicy;

/// Bound dependencies an engine run needs. Cheap to clone (everything
/// inside is already `Arc`-backed).
#[derive(Clone)]
pub struct EngineDeps {
    pub session_store: Arc<dyn SessionStore>,
    pub tools: Arc<ToolRegistry>,
    pub llm: Arc<dyn LlmPort>,
    pub broadcaster: Broadcaster,
    pub policy: EnginePolicy,
    pub redactor: Arc<alex_events::Redactor>,
}

/// One pending tool call result collected during `ProcessingToolCalls`.
#[derive(Debug, Clone)]
pub(crate) struct ToolOutcome {
    pub call_id: String,
    pub result: String,
    pub status: ToolCallStatus,
    pub truncated: bool,
}

/// Per-task working state threaded through every transition. `messages`
/// is a local snapshot; the session store remains the durable log and is
/// appended to as each step completes (spec §4.5 step 7).
pub struct TaskContext {
    pub user_id: String,
    pub session_id: String,
    pub task_id: String,
    pub messages: Vec<Message>,
}

/// The ReAct state machine (spec §4.5): `Planning → Thinking → Deciding →
/// (ActingTool | Answering) → Observing → Planning`, terminal `Done`/`Failed`.
/// Named here `BeforeLlmCall`/`CallLlm`/`AfterLlm`/`ProcessingToolCalls` to
/// match the teacher's transition-function naming.
pub(crate) enum ExecutionState {
    BeforeLlmCall {
        iteration: u32,
    },
    CallLlm {
        iteration: u32,
    },
    AfterLlm {
        iteration: u32,
        response: CompletionResponse,
        started_at: Instant,
    },
    ProcessingToolCalls {
        iteration: u32,
        calls: Vec<alex_llm::ToolCallRequest>,
        assistant_text: String,
    },
    IterationDone {
        iteration: u32,
    },
    Done {
        final_answer: String,
        total_iterations: u32,
    },
    Failed {
        error: EngineError,
    },
    Cancelled,
}

/// Final result of a task run, handed back to the Coordinator.
pub enum TaskOutcome {
    Completed { final_answer: String },
    Failed { error: EngineError },
    Cancelled,
}

/// Run the full ReAct loop for one task (spec §4.5). Emits every event on
/// `deps.broadcaster` as it goes; the caller is responsible for already
/// having appended the user's prompt to the session before calling this.
#[instrument(name = "engine.run_task", skip(deps, ctx, cancel), fields(session_id = %ctx.session_id, task_id = %ctx.task_id))]
pub async fn run_task(deps: &EngineDeps, mut ctx: TaskContext, cancel: CancellationToken) -> TaskOutcome {
    deps.broadcaster
        .publish(&ctx.session_id, &ctx.task_id, None, EventKind::TaskStarted)
        .await;

    let mut state = ExecutionState::BeforeLlmCall { iteration: 1 };

    loop {
        if cancel.is_cancelled() {
            deps.broadcaster
                .publish(
                    &ctx.session_id,
                    &ctx.task_id,
                    None,
                    EventKind::Error {
                        kind: alex_events::ErrorKind::Cancelled,
                        message: "task cancelled".into(),
                        recoverable: false,
                    },
                )
                .await;
            return TaskOutcome::Cancelled;
        }

        state = match state {
            ExecutionState::BeforeLlmCall { iteration } => {
                maintenance::maybe_compact(deps, &mut ctx).await;
                transitions::before_llm_call(deps, &ctx, iteration).await
            }
            ExecutionState::CallLlm { iteration } => {
                transitions::call_llm(deps, &mut ctx, iteration, &cancel).await
            }
            ExecutionState::AfterLlm {
                iteration,
                response,
                started_at,
            } => transitions::after_llm(deps, &mut ctx, iteration, response, started_at).await,
            ExecutionState::ProcessingToolCalls {
                iteration,
                calls,
                assistant_text,
            } => {
                tool_calls::process_tool_calls(deps, &mut ctx, iteration, calls, assistant_text, &cancel)
                    .await
            }
            ExecutionState::IterationDone { iteration } => {
                deps.broadcaster
                    .publish(
                        &ctx.session_id,
                        &ctx.task_id,
                        Some(iteration),
                        EventKind::IterationComplete {
                            summary: format!("iteration {iteration} complete"),
                            usage: alex_events::TokenUsage::default(),
                        },
                    )
                    .await;
                if iteration >= deps.policy.max_iterations {
                    ExecutionState::Failed {
                        error: EngineError::IterationLimit,
                    }
                } else {
                    ExecutionState::BeforeLlmCall {
                        iteration: iteration + 1,
                    }
                }
            }
            ExecutionState::Done {
                final_answer,
                total_iterations,
            } => {
                deps.broadcaster
                    .publish(
                        &ctx.session_id,
                        &ctx.task_id,
                        None,
                        EventKind::TaskComplete {
                            final_answer: final_answer.clone(),
                            total_iterations,
                            cost_usd: None,
                        },
                    )
                    .await;
                return TaskOutcome::Completed { final_answer };
            }
            ExecutionState::Failed { error } => {
                deps.broadcaster
                    .publish(
                        &ctx.session_id,
                        &ctx.task_id,
                        None,
                        EventKind::Error {
                            kind: error_kind(&error),
                            message: error.to_string(),
                            recoverable: error.recoverable(),
                        },
                    )
                    .await;
                let _ = deps
                    .session_store
                    .append_message(
                        &ctx.user_id,
                        &ctx.session_id,
                        Message::assistant(format!("Task failed: {error}"), vec![]),
                    )
                    .await;
                return TaskOutcome::Failed { error };
            }
            ExecutionState::Cancelled => return TaskOutcome::Cancelled,
        };
    }
}

fn error_kind(error: &EngineError) -> alex_events::ErrorKind {
    use alex_events::ErrorKind as EK;
    match error.kind() {
        "invalid_request" => EK::InvalidRequest,
        "unauthorized" => EK::Unauthorized,
        "not_found" => EK::NotFound,
        "rate_limited" => EK::RateLimited,
        "upstream_unavailable" => EK::UpstreamUnavailable,
        "context_length_exceeded" => EK::ContextLengthExceeded,
        "tool_unknown" => EK::ToolUnknown,
        "tool_invalid_arguments" => EK::ToolInvalidArguments,
        "tool_timeout" => EK::ToolTimeout,
        "tool_failed" => EK::ToolFailed,
        "iteration_limit" => EK::IterationLimit,
        "cancelled" => EK::Cancelled,
        _ => EK::Internal,
    }
}

pub(crate) fn to_llm_messages(messages: &[Message]) -> Vec<LlmMessage> {
    messages
        .iter()
        .map(|m| LlmMessage {
            role: Some(match m.role {
                SessionRole::User => LlmRole::User,
                SessionRole::Assistant => LlmRole::Assistant,
                SessionRole::Tool => LlmRole::Tool,
                SessionRole::System => LlmRole::System,
            }),
            content: m.content.clone(),
            tool_calls: m.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|c| alex_llm::ToolCallRequest {
                        id: c.call_id.clone(),
                        name: c.tool_name.clone(),
                        arguments: serde_json::from_str(&c.arguments).unwrap_or(serde_json::Value::Null),
                    })
                    .collect()
            }),
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

pub(crate) fn tool_status_to_session(status: ToolCallStatus) -> ToolMessageStatus {
    match status {
        ToolCallStatus::Ok => ToolMessageStatus::Ok,
        ToolCallStatus::Error => ToolMessageStatus::Error,
        ToolCallStatus::Timeout => ToolMessageStatus::Timeout,
    }
}
