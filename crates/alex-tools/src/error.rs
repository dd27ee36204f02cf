use thiserror::Error;

/// Stable taxonomy for tool invocation failures (spec §4.3 / §7).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("unknown tool: {0}")]
    NotFound(String),
    #[error("denied by policy: {0}")]
    Denied(String),
    #[error("tool timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("tool failed: {0}")]
    ToolFailed(String),
}

impl ToolError {
    /// The machine-readable reason string fed back to the model in a
    /// synthetic `tool` role message (spec §4.5 edge cases).
    pub fn reason_code(&self) -> &'static str {
        match self {
            ToolError::InvalidArguments(_) => "invalid_arguments",
            ToolError::NotFound(_) => "unknown_tool",
            ToolError::Denied(_) => "denied",
            ToolError::Timeout(_) => "timeout",
            ToolError::ToolFailed(_) => "tool_failed",
        }
    }
}
