//! Step 6-7 of the iteration protocol (spec §4.5): invoke each requested
//! tool call, in declared order, emitting the `tool_call_*` events and
//! feeding results back into the session as `tool` role messages.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use alex_events::{EventKind, ToolCallStatus};
use alex_session::domain::Message;
use alex_tools::{ToolContext, ToolError};
use tokio_util::sync::CancellationToken;

use super::{tool_status_to_session, ExecutionState, TaskContext, ToolOutcome};
use crate::EngineDeps;

/// Invoke every tool call for this iteration, append their results to the
/// session, then hand off to `IterationDone`.
pub(super) async fn process_tool_calls(
    deps: &EngineDeps,
    ctx: &mut TaskContext,
    iteration: u32,
    calls: Vec<alex_llm::ToolCallRequest>,
    _assistant_text: String,
    cancel: &CancellationToken,
) -> ExecutionState {
    // Parallel-safe calls may run concurrently with each other; the rest
    // run serially. Either way, publication order follows `calls`' order,
    // since the broadcaster's ingest channel serialises actual delivery
    // and we re-append results below in `calls`' original order regardless
    // of which batch finished first (spec §4.5 step 6).
    let (parallel, serial): (Vec<_>, Vec<_>) = calls.iter().cloned().partition(|call| {
        deps.tools
            .lookup(&call.name)
            .map(|tool| tool.spec().parallel_safe)
            .unwrap_or(false)
    });

    let mut outcomes: HashMap<String, ToolOutcome> = HashMap::new();

    if !parallel.is_empty() {
        let futures = parallel.into_iter().map(|call| run_one(deps, ctx, iteration, call, cancel));
        for outcome in futures::future::join_all(futures).await {
            outcomes.insert(outcome.call_id.clone(), outcome);
        }
    }

    for call in serial {
        let outcome = run_one(deps, ctx, iteration, call, cancel).await;
        outcomes.insert(outcome.call_id.clone(), outcome);
    }

    for call in &calls {
        let Some(outcome) = outcomes.remove(&call.id) else {
            continue;
        };
        let message = Message::tool_result(
            outcome.call_id.clone(),
            outcome.result.clone(),
            tool_status_to_session(outcome.status),
        );
        ctx.messages.push(message.clone());
        if let Err(error) = deps
            .session_store
            .append_message(&ctx.user_id, &ctx.session_id, message)
            .await
        {
            return ExecutionState::Failed { error: error.into() };
        }
    }

    ExecutionState::IterationDone { iteration }
}

async fn run_one(
    deps: &EngineDeps,
    ctx: &TaskContext,
    iteration: u32,
    call: alex_llm::ToolCallRequest,
    cancel: &CancellationToken,
) -> ToolOutcome {
    let redacted_args = deps.redactor.redact_value(&call.arguments);
    deps.broadcaster
        .publish(
            &ctx.session_id,
            &ctx.task_id,
            Some(iteration),
            EventKind::ToolCallStart {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                arguments: redacted_args,
            },
        )
        .await;

    let started_at = Instant::now();
    let tool_context = ToolContext {
        session_id: ctx.session_id.clone(),
        call_id: call.id.clone(),
        files: Arc::new(HashMap::new()),
    };

    let result = deps
        .tools
        .invoke_cancellable(
            &call.name,
            call.arguments.clone(),
            tool_context,
            None,
            cancel.clone(),
            deps.policy.tool_force_kill_grace,
        )
        .await;

    let duration_ms = started_at.elapsed().as_millis() as u64;

    match result {
        Ok(raw) => {
            let (result, truncated) = truncate(raw, deps.policy.tool_result_truncate);
            deps.broadcaster
                .publish(
                    &ctx.session_id,
                    &ctx.task_id,
                    Some(iteration),
                    EventKind::ToolCallComplete {
                        call_id: call.id.clone(),
                        result: result.clone(),
                        duration_ms,
                        status: ToolCallStatus::Ok,
                        truncated,
                    },
                )
                .await;
            ToolOutcome {
                call_id: call.id,
                result,
                status: ToolCallStatus::Ok,
                truncated,
            }
        }
        Err(error) => {
            // Unknown tool names and malformed arguments both land here
            // (`ToolError::NotFound`/`InvalidArguments`) and are fed back
            // to the model as a structured `error` tool message so it can
            // recover instead of crashing the task (spec §4.5 edge cases).
            let status = if matches!(error, ToolError::Timeout(_)) {
                ToolCallStatus::Timeout
            } else {
                ToolCallStatus::Error
            };
            let payload = serde_json::json!({
                "reason": error.reason_code(),
                "message": error.to_string(),
            })
            .to_string();
            deps.broadcaster
                .publish(
                    &ctx.session_id,
                    &ctx.task_id,
                    Some(iteration),
                    EventKind::ToolCallComplete {
                        call_id: call.id.clone(),
                        result: payload.clone(),
                        duration_ms,
                        status,
                        truncated: false,
                    },
                )
                .await;
            ToolOutcome {
                call_id: call.id,
                result: payload,
                status,
                truncated: false,
            }
        }
    }
}

/// Truncate an oversized tool result mid-record with a trailing ellipsis
/// marker (spec §4.5 edge cases).
fn truncate(result: String, limit: usize) -> (String, bool) {
    if result.len() <= limit {
        (result, false)
    } else {
        let mut truncated: String = result.chars().take(limit).collect();
        truncated.push_str("... [truncated]");
        (truncated, true)
    }
}
