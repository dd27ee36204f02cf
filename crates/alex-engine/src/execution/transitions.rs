//! `BeforeLlmCall` / `CallLlm` / `AfterLlm` transitions (spec §4.5 steps
//! 1-5), grounded on the teacher's `agent/execution/transitions.rs` split
//! between "gather state", "call the model" and "interpret the response".

use std::time::Instant;

use alex_events::EventKind;
use alex_llm::{CompletionRequest, CompletionResponse, ToolChoice, ToolDefinition};
use alex_session::domain::{Message, ToolCallRequest as SessionToolCallRequest};

use super::maintenance::compact_oldest_range;
use super::{llm_retry, to_llm_messages, ExecutionState, TaskContext};
use crate::error::EngineError;
use crate::EngineDeps;

const SYSTEM_PROMPT: &str = "You are ALEX, an autonomous software engineering agent. \
Use the tools available to you to complete the user's task, then answer directly \
once you have enough information.";

/// Step 1-2: emit `iteration_start`, ensure a system prompt heads the
/// conversation, and move on to the LLM call.
pub(super) async fn before_llm_call(deps: &EngineDeps, ctx: &TaskContext, iteration: u32) -> ExecutionState {
    deps.broadcaster
        .publish(&ctx.session_id, &ctx.task_id, Some(iteration), EventKind::IterationStart)
        .await;
    ExecutionState::CallLlm { iteration }
}

/// Step 3-4: build the request from the session snapshot, call the LLM
/// with retry, and route the aggregated response onward.
pub(super) async fn call_llm(
    deps: &EngineDeps,
    ctx: &mut TaskContext,
    iteration: u32,
    cancel: &tokio_util::sync::CancellationToken,
) -> ExecutionState {
    let started_at = Instant::now();
    let request = build_request(deps, ctx);

    match llm_retry::complete(deps, &request, &ctx.session_id, &ctx.task_id, iteration, cancel).await {
        Ok(response) => ExecutionState::AfterLlm {
            iteration,
            response,
            started_at,
        },
        Err(EngineError::ContextLengthExceeded) => {
            recover_from_context_overflow(deps, ctx, iteration, cancel, started_at).await
        }
        Err(error) => ExecutionState::Failed { error },
    }
}

fn build_request(deps: &EngineDeps, ctx: &TaskContext) -> CompletionRequest {
    let mut messages = to_llm_messages(&ctx.messages);
    if !matches!(messages.first().map(|m| m.role), Some(Some(alex_llm::Role::System))) {
        messages.insert(0, alex_llm::ChatMessage::system(SYSTEM_PROMPT));
    }

    let tool_specs = deps.tools.list(deps.policy.tool_preset, &[]);
    let tools: Vec<ToolDefinition> = tool_specs
        .iter()
        .map(|spec| ToolDefinition {
            name: spec.name.to_string(),
            description: spec.description.to_string(),
            parameters_schema: spec.arguments_schema.clone(),
        })
        .collect();

    let mut request = CompletionRequest::new(messages);
    if !tools.is_empty() {
        request = request.with_tools(tools).with_tool_choice(ToolChoice::Auto);
    }
    request
}

/// Spec §7: `context_length_exceeded` is recoverable inside the engine —
/// compress the oldest compactable range of history and retry the call
/// exactly once. If there's nothing left to compact, or the retry fails
/// too, the task fails.
async fn recover_from_context_overflow(
    deps: &EngineDeps,
    ctx: &mut TaskContext,
    iteration: u32,
    cancel: &tokio_util::sync::CancellationToken,
    started_at: Instant,
) -> ExecutionState {
    if !compact_oldest_range(deps, ctx).await {
        return ExecutionState::Failed {
            error: EngineError::ContextLengthExceeded,
        };
    }

    let request = build_request(deps, ctx);
    match llm_retry::complete(deps, &request, &ctx.session_id, &ctx.task_id, iteration, cancel).await {
        Ok(response) => ExecutionState::AfterLlm {
            iteration,
            response,
            started_at,
        },
        Err(error) => ExecutionState::Failed { error },
    }
}

/// Step 4-5: emit `think_complete` + the final `assistant_message`, persist
/// the assistant turn, and either finish the task or move to tool
/// execution.
pub(super) async fn after_llm(
    deps: &EngineDeps,
    ctx: &mut TaskContext,
    iteration: u32,
    response: CompletionResponse,
    _started_at: Instant,
) -> ExecutionState {
    let assistant_text = response.message.content.clone();

    deps.broadcaster
        .publish(&ctx.session_id, &ctx.task_id, Some(iteration), EventKind::ThinkComplete)
        .await;
    deps.broadcaster
        .publish(
            &ctx.session_id,
            &ctx.task_id,
            Some(iteration),
            EventKind::AssistantMessage {
                delta: assistant_text.clone(),
                is_final: true,
                source_model: deps.policy.model.clone(),
            },
        )
        .await;

    let tool_calls: Vec<SessionToolCallRequest> = response
        .message
        .tool_calls
        .clone()
        .unwrap_or_default()
        .iter()
        .map(|c| SessionToolCallRequest {
            call_id: c.id.clone(),
            tool_name: c.name.clone(),
            arguments: c.arguments.to_string(),
        })
        .collect();

    let assistant_message = Message::assistant(assistant_text.clone(), tool_calls);
    ctx.messages.push(assistant_message.clone());
    if let Err(error) = deps
        .session_store
        .append_message(&ctx.user_id, &ctx.session_id, assistant_message)
        .await
    {
        return ExecutionState::Failed { error: error.into() };
    }

    match response.message.tool_calls {
        Some(calls) if !calls.is_empty() => ExecutionState::ProcessingToolCalls {
            iteration,
            calls,
            assistant_text,
        },
        _ => ExecutionState::Done {
            final_answer: assistant_text,
            total_iterations: iteration,
        },
    }
}
