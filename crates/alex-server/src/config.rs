//! Layered configuration: embedded defaults → system file → user file →
//! environment variables → CLI flags, lowest to highest precedence.
//! Modeled on a hand-rolled TOML loader, scaled down to the handful of
//! keys this runtime actually recognizes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use alex_tools::Preset;
use serde::Deserialize;

/// Every field is optional so a layer only needs to specify what it wants
/// to override; layers are merged by `Partial::merge`, highest-precedence
/// layer last.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialConfig {
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub max_iterations: Option<u32>,
    pub tool_preset: Option<String>,
    pub compress_threshold: Option<usize>,
    pub task_timeout_secs: Option<u64>,
    pub max_concurrent_tasks: Option<usize>,
    pub server_port: Option<u16>,
    pub subscriber_queue_size: Option<usize>,
    pub replay_window: Option<usize>,
    pub sessions_root: Option<PathBuf>,
}

impl PartialConfig {
    fn merge(self, higher: PartialConfig) -> Self {
        Self {
            llm_base_url: higher.llm_base_url.or(self.llm_base_url),
            llm_api_key: higher.llm_api_key.or(self.llm_api_key),
            llm_model: higher.llm_model.or(self.llm_model),
            max_iterations: higher.max_iterations.or(self.max_iterations),
            tool_preset: higher.tool_preset.or(self.tool_preset),
            compress_threshold: higher.compress_threshold.or(self.compress_threshold),
            task_timeout_secs: higher.task_timeout_secs.or(self.task_timeout_secs),
            max_concurrent_tasks: higher.max_concurrent_tasks.or(self.max_concurrent_tasks),
            server_port: higher.server_port.or(self.server_port),
            subscriber_queue_size: higher.subscriber_queue_size.or(self.subscriber_queue_size),
            replay_window: higher.replay_window.or(self.replay_window),
            sessions_root: higher.sessions_root.or(self.sessions_root),
        }
    }

    fn from_file(path: &Path) -> PartialConfig {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|content| toml::from_str(&content).ok())
            .unwrap_or_default()
    }

    fn from_env() -> PartialConfig {
        PartialConfig {
            llm_base_url: std::env::var("ALEX_LLM_BASE_URL").ok(),
            llm_api_key: std::env::var("ALEX_LLM_API_KEY").ok(),
            llm_model: std::env::var("ALEX_LLM_MODEL").ok(),
            max_iterations: std::env::var("ALEX_MAX_ITERATIONS").ok().and_then(|v| v.parse().ok()),
            tool_preset: std::env::var("ALEX_TOOL_PRESET").ok(),
            compress_threshold: std::env::var("ALEX_COMPRESS_THRESHOLD").ok().and_then(|v| v.parse().ok()),
            task_timeout_secs: std::env::var("ALEX_TASK_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()),
            max_concurrent_tasks: std::env::var("ALEX_MAX_CONCURRENT_TASKS").ok().and_then(|v| v.parse().ok()),
            server_port: std::env::var("ALEX_SERVER_PORT").ok().and_then(|v| v.parse().ok()),
            subscriber_queue_size: std::env::var("ALEX_SUBSCRIBER_QUEUE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok()),
            replay_window: std::env::var("ALEX_REPLAY_WINDOW").ok().and_then(|v| v.parse().ok()),
            sessions_root: std::env::var("ALEX_SESSIONS_ROOT").ok().map(PathBuf::from),
        }
    }
}

/// Resolved, fully-defaulted configuration ready to build the engine from.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub max_iterations: u32,
    pub tool_preset: Preset,
    pub compress_threshold: usize,
    pub task_timeout: Duration,
    pub max_concurrent_tasks: usize,
    pub server_port: u16,
    pub subscriber_queue_size: usize,
    pub replay_window: usize,
    pub sessions_root: PathBuf,
}

impl ServerConfig {
    /// Merge defaults → `/etc/alex/config.toml` → `~/.alex/config.toml` →
    /// `ALEX_*` env vars → `cli_overrides`, in that order.
    pub fn load(cli_overrides: PartialConfig) -> Self {
        let mut merged = PartialConfig::default();
        merged = merged.merge(PartialConfig::from_file(Path::new("/etc/alex/config.toml")));
        if let Some(home) = dirs::home_dir() {
            merged = merged.merge(PartialConfig::from_file(&home.join(".alex/config.toml")));
        }
        merged = merged.merge(PartialConfig::from_env());
        merged = merged.merge(cli_overrides);
        Self::from_partial(merged)
    }

    fn from_partial(p: PartialConfig) -> Self {
        let tool_preset = p
            .tool_preset
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Preset::Full);

        Self {
            llm_base_url: p.llm_base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            llm_api_key: p.llm_api_key,
            llm_model: p.llm_model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            max_iterations: p.max_iterations.unwrap_or(10),
            tool_preset,
            compress_threshold: p.compress_threshold.unwrap_or(8_000),
            task_timeout: Duration::from_secs(p.task_timeout_secs.unwrap_or(600)),
            max_concurrent_tasks: p.max_concurrent_tasks.unwrap_or(4),
            server_port: p.server_port.unwrap_or(8080),
            subscriber_queue_size: p.subscriber_queue_size.unwrap_or(100),
            replay_window: p.replay_window.unwrap_or(50),
            sessions_root: p.sessions_root.unwrap_or_else(|| PathBuf::from("./alex-sessions")),
        }
    }
}
