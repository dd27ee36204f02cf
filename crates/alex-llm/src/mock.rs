//! Deterministic `LlmPort` test double (spec §4.4: "mockable for
//! deterministic engine tests"), grounded on the teacher's pattern of
//! scripting provider responses in its own provider test suites.

use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{stream, Stream};

use crate::error::LlmError;
use crate::port::LlmPort;
use crate::request::CompletionRequest;
use crate::response::{CompletionResponse, StreamEvent};

/// Replays a fixed script of responses, one per call, in order. Panics
/// (via `expect`) if called more times than scripted — tests should size
/// the script to the exact number of iterations expected.
pub struct MockLlmPort {
    responses: Mutex<Vec<Result<CompletionResponse, LlmError>>>,
    stream_responses: Mutex<Vec<Result<Vec<StreamEvent>, LlmError>>>,
    streaming: bool,
}

impl MockLlmPort {
    pub fn new(responses: Vec<Result<CompletionResponse, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            stream_responses: Mutex::new(Vec::new()),
            streaming: false,
        }
    }

    pub fn with_streams(mut self, stream_responses: Vec<Result<Vec<StreamEvent>, LlmError>>) -> Self {
        self.stream_responses = Mutex::new(stream_responses);
        self.streaming = true;
        self
    }
}

#[async_trait]
impl LlmPort for MockLlmPort {
    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            panic!("MockLlmPort::complete called more times than scripted");
        }
        responses.remove(0)
    }

    async fn stream_complete(
        &self,
        _request: &CompletionRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>, LlmError> {
        let mut responses = self.stream_responses.lock().unwrap();
        if responses.is_empty() {
            panic!("MockLlmPort::stream_complete called more times than scripted");
        }
        let events = responses.remove(0)?;
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ChatMessage, FinishReason, Role};
    use crate::request::CompletionRequest;

    #[tokio::test]
    async fn replays_scripted_responses_in_order() {
        let mock = MockLlmPort::new(vec![
            Ok(CompletionResponse {
                message: ChatMessage::assistant("first"),
                finish_reason: FinishReason::Stop,
                usage: None,
            }),
            Ok(CompletionResponse {
                message: ChatMessage::assistant("second"),
                finish_reason: FinishReason::Stop,
                usage: None,
            }),
        ]);

        let request = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        let first = mock.complete(&request).await.unwrap();
        let second = mock.complete(&request).await.unwrap();
        assert_eq!(first.message.content, "first");
        assert_eq!(second.message.content, "second");
        assert_eq!(first.message.role, Some(Role::Assistant));
    }

    #[tokio::test]
    #[should_panic(expected = "more times than scripted")]
    async fn panics_when_exhausted() {
        let mock = MockLlmPort::new(vec![]);
        let request = CompletionRequest::new(vec![]);
        let _ = mock.complete(&request).await;
    }
}
