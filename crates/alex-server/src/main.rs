mod auth;
mod config;
mod error;
mod routes;
mod sse;
mod state;

use std::sync::Arc;

use alex_engine::{Broadcaster, BroadcasterConfig, Coordinator, CoordinatorDeps, EnginePolicy};
use alex_events::Redactor;
use alex_llm::OpenAiCompatiblePort;
use alex_session::FileSessionStore;
use alex_tools::builtins::{CountLinesTool, EchoTool};
use alex_tools::ToolRegistry;
use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::{PartialConfig, ServerConfig};
use state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about = "HTTP/SSE transport for the ALEX agent runtime")]
struct Args {
    /// Address to bind the service to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: String,
    /// Override the configured LLM base URL.
    #[arg(long)]
    llm_base_url: Option<String>,
    /// Override the configured LLM API key.
    #[arg(long)]
    llm_api_key: Option<String>,
    /// Override the configured LLM model.
    #[arg(long)]
    llm_model: Option<String>,
    /// Root directory for session JSON files.
    #[arg(long)]
    sessions_root: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("alex_server=info,tower_http=info"));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let args = Args::parse();
    let config = ServerConfig::load(PartialConfig {
        llm_base_url: args.llm_base_url,
        llm_api_key: args.llm_api_key,
        llm_model: args.llm_model,
        sessions_root: args.sessions_root,
        ..Default::default()
    });

    if config.llm_api_key.is_none() {
        tracing::warn!("no LLM API key configured; completion requests will fail with an auth error");
    }

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

    let broadcaster = Broadcaster::new(BroadcasterConfig {
        ingest_capacity: 256,
        subscriber_queue_size: config.subscriber_queue_size,
        replay_window: config.replay_window,
    });
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

    let coordinator = Arc::new(Coordinator::new(CoordinatorDeps {
        session_store,
        tools,
        llm,
        broadcaster,
        policy,
        redactor: Arc::new(Redactor::default()),
    }));

    let state = AppState { coordinator };

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/api/tasks", post(routes::submit_task))
        .route("/api/tasks/:task_id", get(routes::get_task))
        .route("/api/tasks/:task_id/cancel", post(routes::cancel_task))
        .route("/api/sessions", get(routes::list_sessions))
        .route("/api/sessions/:session_id", get(routes::get_session).delete(routes::delete_session))
        .route("/api/sse", get(sse::handle_sse))
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!(addr = %args.addr, "starting alex-server");
    // No read/idle timeout is layered on: it needs to outlive a slow SSE
    // consumer and long-running task submissions by several minutes, and
    // hyper/axum::serve impose none by default.
    let listener = tokio::net::TcpListener::bind(&args.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
