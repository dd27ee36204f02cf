use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::ToolError;
use crate::tool::{ChunkSink, Tool, ToolContext, ToolSpec};

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct EchoArgs {
    text: String,
}

/// Reference tool: returns its input unchanged. No capabilities, no I/O,
/// safe to run concurrently — used in tests and as the minimal example
/// of the `Tool` trait.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn spec(&self) -> &ToolSpec {
        static SPEC: OnceLock<ToolSpec> = OnceLock::new();
        SPEC.get_or_init(|| ToolSpec {
            name: "echo",
            description: "Returns the given text unchanged.",
            arguments_schema: serde_json::to_value(schemars::schema_for!(EchoArgs))
                .expect("EchoArgs schema always serializes"),
            capabilities: vec![],
            default_timeout: Duration::from_secs(5),
            supports_streaming: false,
            parallel_safe: true,
        })
    }

    async fn invoke(
        &self,
        args: Value,
        _ctx: &ToolContext,
        _chunks: Option<ChunkSink>,
    ) -> Result<String, ToolError> {
        let args: EchoArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        Ok(args.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn echoes_its_input() {
        let tool = EchoTool;
        let out = tool
            .invoke(json!({"text": "hi"}), &ToolContext::default(), None)
            .await
            .unwrap();
        assert_eq!(out, "hi");
    }

    #[test]
    fn spec_declares_no_capabilities_and_parallel_safety() {
        let spec = EchoTool.spec();
        assert!(spec.capabilities.is_empty());
        assert!(spec.parallel_safe);
    }
}
