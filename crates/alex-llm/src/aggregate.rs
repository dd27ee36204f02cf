use std::collections::BTreeMap;

use futures_util::{Stream, StreamExt};

use crate::error::LlmError;
use crate::message::{ChatMessage, FinishReason, Role, ToolCallRequest};
use crate::response::{CompletionResponse, StreamEvent};

/// Assembles the deltas of a `StreamEvent` stream into a single
/// `CompletionResponse`. Grounded on the teacher's per-block buffering in
/// `agent/execution/transitions.rs`: tool call JSON arrives as `partial_json`
/// fragments keyed by block index and is only valid once a
/// `ToolCallComplete` (or, if the provider omits it, a closing `Done`)
/// arrives for that index.
pub async fn aggregate_stream(
    mut stream: std::pin::Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>,
) -> Result<CompletionResponse, LlmError> {
    let mut text = String::new();
    let mut tool_calls: BTreeMap<usize, ToolCallRequest> = BTreeMap::new();
    let mut pending_args: BTreeMap<usize, (String, String, String)> = BTreeMap::new(); // index -> (id, name, json so far)
    let mut usage = None;
    let mut finish_reason = FinishReason::Stop;

    while let Some(item) = stream.next().await {
        match item? {
            StreamEvent::TextDelta(delta) => text.push_str(&delta),
            // Reasoning deltas are surfaced live by the engine's own
            // stream-driving loop (spec §4.5 step 3); the aggregated
            // response only needs the final answer text.
            StreamEvent::ReasoningDelta(_) => {}
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
    let message = ChatMessage {
        role: Some(Role::Assistant),
        content: text,
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
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

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::json;

    fn ev(e: StreamEvent) -> Result<StreamEvent, LlmError> {
        Ok(e)
    }

    #[tokio::test]
    async fn assembles_text_and_tool_calls_across_deltas() {
        let events = vec![
            ev(StreamEvent::TextDelta("Hello".into())),
            ev(StreamEvent::TextDelta(", world".into())),
            ev(StreamEvent::ToolCallStart {
                index: 0,
                id: "call_1".into(),
                name: "echo".into(),
            }),
            ev(StreamEvent::ToolCallArgsDelta {
                index: 0,
                partial_json: "{\"text\":".into(),
            }),
            ev(StreamEvent::ToolCallArgsDelta {
                index: 0,
                partial_json: "\"hi\"}".into(),
            }),
            ev(StreamEvent::ToolCallComplete {
                index: 0,
                tool_call: ToolCallRequest {
                    id: "call_1".into(),
                    name: "echo".into(),
                    arguments: json!({"text": "hi"}),
                },
            }),
            ev(StreamEvent::Done {
                finish_reason: FinishReason::ToolCalls,
            }),
        ];
        let stream = Box::pin(stream::iter(events));
        let response = aggregate_stream(stream).await.unwrap();
        assert_eq!(response.message.content, "Hello, world");
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        let calls = response.message.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn falls_back_to_parsing_buffered_json_if_complete_is_missing() {
        let events = vec![
            ev(StreamEvent::ToolCallStart {
                index: 0,
                id: "call_1".into(),
                name: "echo".into(),
            }),
            ev(StreamEvent::ToolCallArgsDelta {
                index: 0,
                partial_json: "{\"text\":\"late\"}".into(),
            }),
            ev(StreamEvent::Done {
                finish_reason: FinishReason::ToolCalls,
            }),
        ];
        let stream = Box::pin(stream::iter(events));
        let response = aggregate_stream(stream).await.unwrap();
        let calls = response.message.tool_calls.unwrap();
        assert_eq!(calls[0].arguments, json!({"text": "late"}));
    }

    #[tokio::test]
    async fn usage_merges_by_field_wise_max() {
        let events = vec![
            ev(StreamEvent::Usage(alex_events::TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 0,
                total_tokens: 10,
            })),
            ev(StreamEvent::Usage(alex_events::TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            })),
            ev(StreamEvent::Done {
                finish_reason: FinishReason::Stop,
            }),
        ];
        let stream = Box::pin(stream::iter(events));
        let response = aggregate_stream(stream).await.unwrap();
        let usage = response.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
    }
}
