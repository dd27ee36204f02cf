use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::ToolError;
use crate::tool::{Capability, ChunkSink, Tool, ToolContext, ToolSpec};

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct CountLinesArgs {
    path: String,
}

/// Reference tool: counts the lines of a file in the in-memory workspace
/// handed to tools via [`ToolContext::files`]. Declares `ReadFilesystem`
/// even though there is no real filesystem behind it, to exercise the
/// preset allow-list in the same way a real file-reading tool would.
pub struct CountLinesTool;

#[async_trait]
impl Tool for CountLinesTool {
    fn spec(&self) -> &ToolSpec {
        static SPEC: OnceLock<ToolSpec> = OnceLock::new();
        SPEC.get_or_init(|| ToolSpec {
            name: "count_lines",
            description: "Counts the lines in a workspace file.",
            arguments_schema: serde_json::to_value(schemars::schema_for!(CountLinesArgs))
                .expect("CountLinesArgs schema always serializes"),
            capabilities: vec![Capability::ReadFilesystem],
            default_timeout: Duration::from_secs(5),
            supports_streaming: false,
            parallel_safe: true,
        })
    }

    async fn invoke(
        &self,
        args: Value,
        ctx: &ToolContext,
        _chunks: Option<ChunkSink>,
    ) -> Result<String, ToolError> {
        let args: CountLinesArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let contents = ctx
            .files
            .get(&args.path)
            .ok_or_else(|| ToolError::ToolFailed(format!("no such file: {}", args.path)))?;
        let count = contents.lines().count();
        Ok(count.to_string())
    }
}
