//! Assembles the in-process engine stack (component wiring mirrors
//! `alex-server`'s `main.rs`, minus the HTTP transport): the CLI talks to
//! the Coordinator directly and renders its own event subscription instead
//! of serialising frames over SSE.

use std::sync::Arc;

use alex_engine::{Broadcaster, BroadcasterConfig, Coordinator, CoordinatorDeps, EnginePolicy};
use alex_events::Redactor;
use alex_llm::OpenAiCompatiblePort;
use alex_session::FileSessionStore;
use alex_tools::builtins::{CountLinesTool, EchoTool};
use alex_tools::ToolRegistry;

use crate::config::CliConfig;

pub fn build_coordinator(config: &CliConfig) -> Coordinator {
    let session_store = Arc::new(FileSessionStore::new(config.sessions_root.clone()));

    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(EchoTool));
    tools.register(Arc::new(CountLinesTool));
    let tools = Arc::new(tools);

    let llm = Arc::new(OpenAiCompatiblePort::new(
        config.llm_base_url.clone(),
        config.llm_api_key.clone().unwrap_or_default(),
        config.llm_model.clone(),
    ));

    let broadcaster = Broadcaster::new(BroadcasterConfig::default());
    broadcaster.register_observer(Arc::new(alex_engine::TracingEventObserver));

    let policy = EnginePolicy {
        max_iterations: config.max_iterations,
        tool_preset: config.tool_preset,
        tool_result_truncate: 16 * 1024,
        tool_force_kill_grace: std::time::Duration::from_secs(5),
        compress_threshold: config.compress_threshold,
        task_timeout: config.task_timeout,
        max_concurrent_tasks: config.max_concurrent_tasks,
        model: config.llm_model.clone(),
    };

    Coordinator::new(CoordinatorDeps {
        session_store,
        tools,
        llm,
        broadcaster,
        policy,
        redactor: Arc::new(Redactor::default()),
    })
}
