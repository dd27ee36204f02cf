//! Compaction policy (spec §4.2): decide *which* messages are eligible to
//! be summarised away. The actual LLM summarisation call is an engine-side
//! concern (it needs the LLM Port); this module only computes the range.

use std::ops::Range;

use crate::domain::{Message, Role};

/// Rough token estimate used only to decide *when* to compact, never to
/// bill or truncate content. 4 bytes/token is the standard rule-of-thumb
/// approximation for English text without a real tokenizer in scope.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

pub fn total_estimated_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

/// A message is "essential" (spec §4.2) if it is:
/// - the system prompt (first `Role::System` message), or
/// - the most recent `Role::User` turn, or
/// - a tool result referenced by an unresolved call (i.e. there exists a
///   prior assistant message requesting a tool call whose matching `Tool`
///   result message hasn't appeared yet — defensive; in a well-formed log
///   every tool call is resolved within its iteration, but compaction must
///   never assume that invariant holds mid-failure-recovery).
fn essential_indices(messages: &[Message]) -> Vec<bool> {
    let mut essential = vec![false; messages.len()];

    if let Some(idx) = messages.iter().position(|m| m.role == Role::System) {
        essential[idx] = true;
    }

    if let Some(idx) = messages.iter().rposition(|m| m.role == Role::User) {
        essential[idx] = true;
    }

    let mut pending_calls: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for (idx, message) in messages.iter().enumerate() {
        match message.role {
            Role::Assistant => {
                for call in message.requested_call_ids() {
                    pending_calls.insert(call.call_id.as_str());
                }
            }
            Role::Tool => {
                if let Some(call_id) = message.tool_call_id.as_deref() {
                    if pending_calls.remove(call_id) {
                        // resolved, not essential on that basis alone
                    } else {
                        // a tool result with no matching request is unusual;
                        // treat conservatively as essential (unresolved).
                        essential[idx] = true;
                    }
                }
            }
            _ => {}
        }
    }

    // Any message still tied to a pending (unresolved) call is essential.
    for (idx, message) in messages.iter().enumerate() {
        if message.role == Role::Assistant
            && message
                .requested_call_ids()
                .iter()
                .any(|c| pending_calls.contains(c.call_id.as_str()))
        {
            essential[idx] = true;
        }
    }

    essential
}

/// The oldest contiguous block of non-essential messages, or `None` if no
/// such block exists (e.g. everything is essential, or the log is too
/// short to be worth compacting).
pub fn oldest_compactable_range(messages: &[Message]) -> Option<Range<usize>> {
    if messages.len() < 2 {
        return None;
    }
    let essential = essential_indices(messages);
    let start = essential.iter().position(|e| !e)?;
    let end = essential[start..]
        .iter()
        .position(|e| *e)
        .map(|offset| start + offset)
        .unwrap_or(messages.len());
    if end <= start {
        None
    } else {
        Some(start..end)
    }
}

/// Whether the session's estimated token total warrants compaction.
pub fn should_compact(messages: &[Message], compress_threshold: usize) -> bool {
    total_estimated_tokens(messages) > compress_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Message, Role, ToolCallRequest, ToolMessageStatus};

    fn msgs() -> Vec<Message> {
        vec![
            Message::system("you are alex"),
            Message::user("do thing A"),
            Message::assistant("ok", vec![]),
            Message::user("do thing B"),
            Message::assistant("ok", vec![]),
            Message::user("most recent turn"),
        ]
    }

    #[test]
    fn system_prompt_and_latest_user_turn_are_essential() {
        let messages = msgs();
        let essential = essential_indices(&messages);
        assert!(essential[0], "system prompt must be essential");
        assert!(
            essential[messages.len() - 1],
            "most recent user turn must be essential"
        );
    }

    #[test]
    fn compactable_range_excludes_essential_head_and_tail() {
        let messages = msgs();
        let range = oldest_compactable_range(&messages).expect("some range");
        assert_eq!(range.start, 1);
        assert!(range.end < messages.len());
    }

    #[test]
    fn unresolved_tool_call_keeps_its_result_essential() {
        let mut messages = vec![Message::system("sys"), Message::user("turn 1")];
        messages.push(Message::assistant(
            "",
            vec![ToolCallRequest {
                call_id: "c1".into(),
                tool_name: "shell".into(),
                arguments: "{}".into(),
            }],
        ));
        messages.push(Message::tool_result("c1", "result", ToolMessageStatus::Ok));
        messages.push(Message::user("most recent"));

        let essential = essential_indices(&messages);
        // the tool result at index 3 resolves the call, and it isn't the
        // most recent user turn either, so it is not forced essential.
        assert!(!essential[3]);

        // Now simulate an UNRESOLVED call: drop the tool result message.
        let mut unresolved = messages.clone();
        unresolved.pop(); // drop "most recent"
        unresolved.pop(); // drop the tool result — call now unresolved
        let essential_unresolved = essential_indices(&unresolved);
        assert!(
            essential_unresolved[2],
            "assistant message with an unresolved tool call must stay essential"
        );
    }

    #[test]
    fn should_compact_respects_threshold() {
        let messages = msgs();
        let total = total_estimated_tokens(&messages);
        assert!(should_compact(&messages, total - 1));
        assert!(!should_compact(&messages, total + 1000));
    }

    #[test]
    fn short_logs_are_never_compactable() {
        assert!(oldest_compactable_range(&[Message::user("hi")]).is_none());
        assert!(oldest_compactable_range(&[]).is_none());
    }
}
