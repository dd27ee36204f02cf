use thiserror::Error;

/// Stable taxonomy mapped 1:1 onto spec §7's identifiers. `ApiError` in
/// `alex-server` maps a subset of these onto HTTP status codes; the rest
/// only ever surface as a domain `error` event, never as a transport
/// status.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("context length exceeded")]
    ContextLengthExceeded,
    #[error("unknown tool: {0}")]
    ToolUnknown(String),
    #[error("invalid tool arguments: {0}")]
    ToolInvalidArguments(String),
    #[error("tool timed out")]
    ToolTimeout,
    #[error("tool failed: {0}")]
    ToolFailed(String),
    #[error("iteration limit reached")]
    IterationLimit,
    #[error("cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// The wire taxonomy identifier from spec §7.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::Unauthorized => "unauthorized",
            EngineError::NotFound(_) => "not_found",
            EngineError::RateLimited(_) => "rate_limited",
            EngineError::UpstreamUnavailable(_) => "upstream_unavailable",
            EngineError::ContextLengthExceeded => "context_length_exceeded",
            EngineError::ToolUnknown(_) => "tool_unknown",
            EngineError::ToolInvalidArguments(_) => "tool_invalid_arguments",
            EngineError::ToolTimeout => "tool_timeout",
            EngineError::ToolFailed(_) => "tool_failed",
            EngineError::IterationLimit => "iteration_limit",
            EngineError::Cancelled => "cancelled",
            EngineError::Internal(_) => "internal",
        }
    }

    /// Whether the task can be retried/continued, echoed onto the
    /// terminal `error` event's `recoverable` field. Only reached here
    /// once the engine's own recovery attempt (compression-and-retry for
    /// `context_length_exceeded`, backoff-and-retry for transient
    /// `rate_limited`/`upstream_unavailable`) has already been exhausted
    /// (spec §7) — so the flag mainly tells a client whether resubmitting
    /// is worth trying again later.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::RateLimited(_) | EngineError::UpstreamUnavailable(_) | EngineError::ContextLengthExceeded
        )
    }
}

impl From<alex_session::error::SessionError> for EngineError {
    fn from(err: alex_session::error::SessionError) -> Self {
        use alex_session::error::SessionError;
        match err {
            SessionError::NotFound => EngineError::NotFound("session".into()),
            SessionError::Unauthorized => EngineError::Unauthorized,
            SessionError::InvalidOperation(msg) => EngineError::InvalidRequest(msg),
            SessionError::Storage(msg) => EngineError::Internal(msg),
        }
    }
}

impl From<alex_llm::LlmError> for EngineError {
    fn from(err: alex_llm::LlmError) -> Self {
        match err {
            alex_llm::LlmError::RateLimited { message, .. } => EngineError::RateLimited(message),
            alex_llm::LlmError::Http(msg) => EngineError::UpstreamUnavailable(msg),
            alex_llm::LlmError::Auth(msg) => EngineError::Internal(format!("auth error: {msg}")),
            alex_llm::LlmError::InvalidRequest(msg) => EngineError::InvalidRequest(msg),
            alex_llm::LlmError::ContextLengthExceeded(_) => EngineError::ContextLengthExceeded,
            alex_llm::LlmError::Provider(msg) => EngineError::UpstreamUnavailable(msg),
            alex_llm::LlmError::Json(msg) => EngineError::Internal(msg),
            alex_llm::LlmError::NotSupported(msg) => EngineError::Internal(msg),
        }
    }
}
