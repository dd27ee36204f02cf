//! Tool registry (component C3, spec §4.3): name → capability lookup,
//! argument validation, per-tool timeout/retry policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jsonschema::validator_for;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::preset::Preset;
use crate::tool::{ChunkSink, Tool, ToolContext, ToolSpec};

pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.spec().name, tool);
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tools visible under a preset allow-list (spec §4.3: CLI contexts
    /// filter by preset; server contexts default to full minus local-only
    /// tools — local-only filtering is left to the caller via `exclude`).
    pub fn list(&self, preset: Preset, exclude: &[&str]) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|t| t.spec().clone())
            .filter(|spec| spec.allowed_in(preset) && !exclude.contains(&spec.name))
            .collect()
    }

    fn validate_arguments(spec: &ToolSpec, args: &Value) -> Result<(), ToolError> {
        let validator = validator_for(&spec.arguments_schema)
            .map_err(|e| ToolError::InvalidArguments(format!("bad schema for {}: {e}", spec.name)))?;
        let errors: Vec<String> = validator.iter_errors(args).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ToolError::InvalidArguments(errors.join("; ")))
        }
    }

    /// Validate, enforce the timeout, and invoke. Not cancellation-aware —
    /// see [`Self::invoke_cancellable`] for the engine's call path, which
    /// additionally force-abandons a tool that ignores a cancel signal.
    pub async fn invoke(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
        chunks: Option<ChunkSink>,
    ) -> Result<String, ToolError> {
        let tool = self
            .lookup(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        Self::validate_arguments(tool.spec(), &args)?;

        let timeout = tool.spec().default_timeout;
        match tokio::time::timeout(timeout, tool.invoke(args, ctx, chunks)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout(timeout)),
        }
    }

    /// Cancellation-aware invocation used by the engine (spec §5): the
    /// tool runs on a dedicated task so it can be aborted. `cancel` fires
    /// on task cancellation; the tool then gets `force_kill_grace` to
    /// return on its own before the task is forcibly aborted.
    pub async fn invoke_cancellable(
        &self,
        name: &str,
        args: Value,
        ctx: ToolContext,
        chunks: Option<ChunkSink>,
        cancel: CancellationToken,
        force_kill_grace: Duration,
    ) -> Result<String, ToolError> {
        let tool = self
            .lookup(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        Self::validate_arguments(tool.spec(), &args)?;

        let timeout = tool.spec().default_timeout;
        let mut handle = tokio::spawn(async move { tool.invoke(args, &ctx, chunks).await });

        enum Outcome {
            Joined(Result<Result<String, ToolError>, tokio::task::JoinError>),
            TimedOut,
            ForceKilled,
        }

        let outcome = tokio::select! {
            result = &mut handle => Outcome::Joined(result),
            _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
            _ = cancel.cancelled() => {
                tokio::select! {
                    result = &mut handle => Outcome::Joined(result),
                    _ = tokio::time::sleep(force_kill_grace) => Outcome::ForceKilled,
                }
            }
        };

        match outcome {
            Outcome::Joined(Ok(result)) => result,
            Outcome::Joined(Err(join_err)) => {
                Err(ToolError::ToolFailed(format!("tool task failed: {join_err}")))
            }
            Outcome::TimedOut => {
                handle.abort();
                Err(ToolError::Timeout(timeout))
            }
            Outcome::ForceKilled => {
                handle.abort();
                Err(ToolError::ToolFailed(
                    "cancelled: tool force-abandoned after grace period".into(),
                ))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::echo::EchoTool;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry
    }

    #[tokio::test]
    async fn invoke_unknown_tool_is_not_found() {
        let registry = registry();
        let err = registry
            .invoke("nope", json!({}), &ToolContext::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn invoke_validates_arguments_against_schema() {
        let registry = registry();
        let err = registry
            .invoke("echo", json!({"wrong_field": 1}), &ToolContext::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn invoke_runs_a_well_formed_call() {
        let registry = registry();
        let result = registry
            .invoke(
                "echo",
                json!({"text": "hello"}),
                &ToolContext::default(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(result, "hello");
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn spec(&self) -> &ToolSpec {
            static SPEC: std::sync::OnceLock<ToolSpec> = std::sync::OnceLock::new();
            SPEC.get_or_init(|| ToolSpec {
                name: "slow",
                description: "sleeps forever",
                arguments_schema: json!({"type": "object"}),
                capabilities: vec![],
                default_timeout: Duration::from_millis(50),
                supports_streaming: false,
                parallel_safe: false,
            })
        }

        async fn invoke(
            &self,
            _args: Value,
            _ctx: &ToolContext,
            _chunks: Option<ChunkSink>,
        ) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("never".into())
        }
    }

    #[tokio::test]
    async fn invoke_times_out_slow_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool));
        let err = registry
            .invoke("slow", json!({}), &ToolContext::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
    }

    struct IgnoresCancelTool {
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Tool for IgnoresCancelTool {
        fn spec(&self) -> &ToolSpec {
            static SPEC: std::sync::OnceLock<ToolSpec> = std::sync::OnceLock::new();
            SPEC.get_or_init(|| ToolSpec {
                name: "stubborn",
                description: "ignores cancellation",
                arguments_schema: json!({"type": "object"}),
                capabilities: vec![],
                default_timeout: Duration::from_secs(10),
                supports_streaming: false,
                parallel_safe: false,
            })
        }

        async fn invoke(
            &self,
            _args: Value,
            _ctx: &ToolContext,
            _chunks: Option<ChunkSink>,
        ) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok("done".into())
        }
    }

    #[tokio::test]
    async fn invoke_cancellable_force_kills_after_grace() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(IgnoresCancelTool {
            finished: finished.clone(),
        }));

        let cancel = CancellationToken::new();
        let registry = Arc::new(registry);
        let registry_clone = registry.clone();
        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move {
            registry_clone
                .invoke_cancellable(
                    "stubborn",
                    json!({}),
                    ToolContext::default(),
                    None,
                    cancel_clone,
                    Duration::from_millis(20),
                )
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ToolError::ToolFailed(_))));
        assert!(!finished.load(Ordering::SeqCst));
    }
}
