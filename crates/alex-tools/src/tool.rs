use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::ToolError;
use crate::preset::Preset;

/// What a tool declares it's capable of doing — informs both the
/// preset allow-list and any future policy/permission layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ReadFilesystem,
    WriteFilesystem,
    ExecuteShell,
    Network,
}

/// Static description of a tool, independent of any particular
/// invocation (spec §4.3).
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments_schema: Value,
    pub capabilities: Vec<Capability>,
    pub default_timeout: Duration,
    pub supports_streaming: bool,
    /// Opt-in flag: the registry only runs two calls to this tool
    /// concurrently within one iteration when this is `true` (spec §4.5:
    /// "treat parallel-safe as an opt-in flag per tool, default to serial").
    pub parallel_safe: bool,
}

impl ToolSpec {
    /// Which preset allow-lists include this tool, derived from its
    /// declared capabilities (spec §4.3: presets are allow-lists).
    pub fn allowed_in(&self, preset: Preset) -> bool {
        match preset {
            Preset::Full => true,
            Preset::ReadOnly => !self
                .capabilities
                .iter()
                .any(|c| matches!(c, Capability::WriteFilesystem | Capability::ExecuteShell)),
            Preset::Safe => !self
                .capabilities
                .iter()
                .any(|c| matches!(c, Capability::ExecuteShell | Capability::Network)),
        }
    }
}

/// Opaque per-invocation context passed to a tool. Concrete tool
/// implementations (shell, file I/O, grep) are external collaborators per
/// spec §1; this context is intentionally narrow.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: String,
    pub call_id: String,
    /// In-memory workspace files available to sandboxed tools (e.g.
    /// `count_lines`). There is no real filesystem or shell access behind
    /// this context — see spec §4.3 Non-goals.
    pub files: Arc<HashMap<String, String>>,
}

/// Sink a streaming-capable tool sends in-progress output chunks to.
/// Mirrors `tool_call_stream` events (spec §4.1).
pub type ChunkSink = UnboundedSender<String>;

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;

    /// Execute the tool. Implementations that declare
    /// `supports_streaming` should send progress through `chunks` as it
    /// becomes available; the registry enforces the timeout around this
    /// call, not the tool itself.
    async fn invoke(
        &self,
        args: Value,
        ctx: &ToolContext,
        chunks: Option<ChunkSink>,
    ) -> Result<String, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(capabilities: Vec<Capability>) -> ToolSpec {
        ToolSpec {
            name: "x",
            description: "x",
            arguments_schema: json!({"type": "object"}),
            capabilities,
            default_timeout: Duration::from_secs(1),
            supports_streaming: false,
            parallel_safe: false,
        }
    }

    #[test]
    fn full_preset_allows_everything() {
        let spec = spec(vec![Capability::ExecuteShell, Capability::Network]);
        assert!(spec.allowed_in(Preset::Full));
    }

    #[test]
    fn read_only_preset_excludes_writes_and_shell_but_allows_network() {
        let reader = spec(vec![Capability::ReadFilesystem, Capability::Network]);
        assert!(reader.allowed_in(Preset::ReadOnly));

        let writer = spec(vec![Capability::WriteFilesystem]);
        assert!(!writer.allowed_in(Preset::ReadOnly));

        let shell = spec(vec![Capability::ExecuteShell]);
        assert!(!shell.allowed_in(Preset::ReadOnly));
    }

    #[test]
    fn safe_preset_excludes_shell_and_network_but_allows_writes() {
        let writer = spec(vec![Capability::WriteFilesystem]);
        assert!(writer.allowed_in(Preset::Safe));

        let shell = spec(vec![Capability::ExecuteShell]);
        assert!(!shell.allowed_in(Preset::Safe));

        let network = spec(vec![Capability::Network]);
        assert!(!network.allowed_in(Preset::Safe));
    }
}
