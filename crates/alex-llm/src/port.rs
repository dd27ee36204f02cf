use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::LlmError;
use crate::request::CompletionRequest;
use crate::response::{CompletionResponse, StreamEvent};

/// Unified streaming/non-streaming completion contract (spec §4.4). A
/// provider adapter implements this once; the engine is agnostic to which
/// concrete LLM backend is behind it.
#[async_trait]
pub trait LlmPort: Send + Sync {
    fn supports_streaming(&self) -> bool {
        false
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Streaming completion. The default implementation reports that
    /// streaming isn't supported; providers that can stream should
    /// override it.
    async fn stream_complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>, LlmError> {
        let _ = request;
        Err(LlmError::NotSupported(
            "streaming not supported by this provider".into(),
        ))
    }
}
