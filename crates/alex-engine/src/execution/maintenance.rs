//! Mid-loop compaction (spec §4.2/§4.5): runs between iterations, never
//! mid-iteration ("complete the current iteration before rewriting
//! history"). Grounded on `alex_session::compaction`'s range computation;
//! this module owns the one step compaction needs that the session crate
//! can't: asking the LLM for a synopsis.

use alex_session::compaction::{oldest_compactable_range, should_compact};
use alex_session::domain::Message;
use alex_llm::{ChatMessage, CompletionRequest};
use tracing::{info, warn};

use super::{to_llm_messages, TaskContext};
use crate::EngineDeps;

const SUMMARY_PROMPT: &str = "Summarize the following conversation excerpt in a few sentences, \
preserving any facts, decisions, or file paths a future turn would need.";

pub(super) async fn maybe_compact(deps: &EngineDeps, ctx: &mut TaskContext) {
    if !should_compact(&ctx.messages, deps.policy.compress_threshold) {
        return;
    }
    compact_oldest_range(deps, ctx).await;
}

/// Compact regardless of the token threshold. Used when the LLM Port
/// itself reports `context_length_exceeded` (spec §7: recoverable inside
/// the engine via compression, then retried once). Returns whether a
/// range was actually compacted — `false` means there was nothing left
/// to shrink, so the caller should not retry the call.
pub(super) async fn compact_oldest_range(deps: &EngineDeps, ctx: &mut TaskContext) -> bool {
    let Some(range) = oldest_compactable_range(&ctx.messages) else {
        return false;
    };

    let excerpt = to_llm_messages(&ctx.messages[range.clone()]);
    let mut request_messages = vec![ChatMessage::system(SUMMARY_PROMPT)];
    request_messages.extend(excerpt);
    let request = CompletionRequest::new(request_messages);

    let synopsis = match deps.llm.complete(&request).await {
        Ok(response) => response.message.content,
        Err(error) => {
            warn!(session_id = %ctx.session_id, %error, "compaction synopsis call failed, skipping this round");
            return false;
        }
    };

    let replacement = vec![Message::system(format!("[compacted summary] {synopsis}"))];
    let expected_len = ctx.messages.len();

    match deps
        .session_store
        .replace_range(&ctx.user_id, &ctx.session_id, range.clone(), expected_len, replacement.clone())
        .await
    {
        Ok(()) => {
            ctx.messages.splice(range, replacement);
            info!(session_id = %ctx.session_id, "compacted session history");
            true
        }
        Err(error) => {
            warn!(session_id = %ctx.session_id, %error, "compaction replace_range lost a race, skipping this round");
            false
        }
    }
}
