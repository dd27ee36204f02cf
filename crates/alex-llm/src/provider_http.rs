//! Minimal OpenAI-compatible HTTP adapter.
//!
//! The concrete LLM provider wire protocol is out of scope for this core
//! (spec §1): the engine only ever talks to [`crate::LlmPort`]. But
//! `alex-server`/`alex-cli` are real binaries that need *something* to run
//! against out of the box, so this ships one narrow, generic adapter —
//! the lowest common denominator "chat completions" shape shared by
//! OpenAI and most OpenAI-compatible providers — rather than the teacher's
//! full multi-vendor plugin host. Non-streaming only: `stream_complete`
//! keeps [`crate::LlmPort`]'s default "not supported" behavior.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;
use crate::message::{ChatMessage, FinishReason, Role, ToolCallRequest, ToolDefinition};
use crate::port::LlmPort;
use crate::request::CompletionRequest;
use crate::response::CompletionResponse;
use alex_events::TokenUsage;

pub struct OpenAiCompatiblePort {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatiblePort {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireToolCallFunction<'a> {
    name: &'a str,
    arguments: String,
}

#[derive(Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolCallFunction<'a>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponseBody {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireResponseToolCall>>,
}

#[derive(Deserialize)]
struct WireResponseToolCall {
    id: String,
    function: WireResponseToolCallFunction,
}

#[derive(Deserialize)]
struct WireResponseToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[derive(Deserialize)]
struct WireErrorEnvelope {
    error: WireErrorBody,
}

#[derive(Deserialize)]
struct WireErrorBody {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// OpenAI and OpenAI-compatible providers signal an over-length request
/// either via a dedicated `error.code` or, for providers that don't set
/// one, a message containing this phrase.
fn is_context_length_error(code: Option<&str>, message: &str) -> bool {
    code == Some("context_length_exceeded") || message.contains("maximum context length")
}

fn role_str(role: Option<Role>) -> &'static str {
    match role {
        Some(Role::System) | None => "system",
        Some(Role::User) => "user",
        Some(Role::Assistant) => "assistant",
        Some(Role::Tool) => "tool",
    }
}

fn to_wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: role_str(m.role),
            content: &m.content,
            tool_calls: m.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|c| WireToolCall {
                        id: &c.id,
                        kind: "function",
                        function: WireToolCallFunction {
                            name: &c.name,
                            arguments: c.arguments.to_string(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: m.tool_call_id.as_deref(),
        })
        .collect()
}

fn to_wire_tools(tools: &[ToolDefinition]) -> Vec<WireTool<'_>> {
    tools
        .iter()
        .map(|t| WireTool {
            kind: "function",
            function: WireFunction {
                name: &t.name,
                description: &t.description,
                parameters: &t.parameters_schema,
            },
        })
        .collect()
}

fn finish_reason_from_wire(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some("stop") | None => FinishReason::Stop,
        Some(_) => FinishReason::Stop,
    }
}

#[async_trait]
impl LlmPort for OpenAiCompatiblePort {
    fn supports_streaming(&self) -> bool {
        false
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatRequestBody {
            model: &self.model,
            messages: to_wire_messages(&request.messages),
            tools: request.tools.as_deref().map(to_wire_tools),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            let parsed_error = serde_json::from_str::<WireErrorEnvelope>(&text).ok();
            let code = parsed_error.as_ref().and_then(|e| e.error.code.as_deref().map(str::to_string));
            let message = parsed_error.map(|e| e.error.message).unwrap_or(text);

            return Err(match status.as_u16() {
                401 | 403 => LlmError::Auth(message),
                429 => LlmError::RateLimited {
                    message,
                    retry_after_secs: retry_after,
                },
                400 | 404 | 422 if is_context_length_error(code.as_deref(), &message) => {
                    LlmError::ContextLengthExceeded(message)
                }
                400 | 404 | 422 => LlmError::InvalidRequest(message),
                _ => LlmError::Provider(format!("{status}: {message}")),
            });
        }

        let parsed: ChatResponseBody = response.json().await.map_err(|e| LlmError::Json(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Provider("response carried no choices".into()))?;

        let tool_calls = choice.message.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|c| ToolCallRequest {
                    id: c.id,
                    name: c.function.name,
                    arguments: serde_json::from_str(&c.function.arguments).unwrap_or(Value::Null),
                })
                .collect()
        });

        Ok(CompletionResponse {
            message: ChatMessage {
                role: Some(Role::Assistant),
                content: choice.message.content.unwrap_or_default(),
                tool_calls,
                tool_call_id: None,
            },
            finish_reason: finish_reason_from_wire(choice.finish_reason.as_deref()),
            usage: parsed.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolChoice;

    #[test]
    fn maps_finish_reasons_from_the_wire() {
        assert_eq!(finish_reason_from_wire(Some("tool_calls")), FinishReason::ToolCalls);
        assert_eq!(finish_reason_from_wire(Some("length")), FinishReason::Length);
        assert_eq!(finish_reason_from_wire(None), FinishReason::Stop);
    }

    #[test]
    fn wire_messages_carry_tool_call_ids_for_tool_role_turns() {
        let messages = vec![ChatMessage::tool_result("call_1", "42")];
        let wire = to_wire_messages(&messages);
        assert_eq!(wire[0].role, "tool");
        assert_eq!(wire[0].tool_call_id, Some("call_1"));
    }

    #[test]
    fn builds_a_well_formed_request_body() {
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")]).with_tool_choice(ToolChoice::Auto);
        let body = ChatRequestBody {
            model: "gpt-4o-mini",
            messages: to_wire_messages(&request.messages),
            tools: None,
            temperature: None,
            max_tokens: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
