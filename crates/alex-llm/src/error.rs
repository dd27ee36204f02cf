use thiserror::Error;

/// Stable taxonomy for LLM port failures (spec §4.4 / §7).
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },
    #[error("context length exceeded: {0}")]
    ContextLengthExceeded(String),
    #[error("response parse error: {0}")]
    Json(String),
    #[error("not supported by this provider: {0}")]
    NotSupported(String),
}

impl LlmError {
    /// Transient network/provider failures worth a capped exponential
    /// retry (spec §4.4: "transient network errors retried with capped
    /// exponential back-off, up to 3 attempts, jitter"). Auth and
    /// malformed-request errors are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Http(_) | LlmError::Provider(_))
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Json(err.to_string())
    }
}
