//! Layered configuration, mirroring `alex-server`'s loader: embedded
//! defaults → system file → user file → environment variables → CLI flags.
//! The user file is the one layer this binary also writes to, backing
//! `alex config set/get/show`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use alex_tools::Preset;
use serde::{Deserialize, Serialize};

fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".alex").join("config.toml"))
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PartialConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress_threshold: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_tasks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions_root: Option<PathBuf>,
}

impl PartialConfig {
    fn merge(self, higher: PartialConfig) -> Self {
        Self {
            llm_provider: higher.llm_provider.or(self.llm_provider),
            llm_base_url: higher.llm_base_url.or(self.llm_base_url),
            llm_api_key: higher.llm_api_key.or(self.llm_api_key),
            llm_model: higher.llm_model.or(self.llm_model),
            max_iterations: higher.max_iterations.or(self.max_iterations),
            tool_preset: higher.tool_preset.or(self.tool_preset),
            compress_threshold: higher.compress_threshold.or(self.compress_threshold),
            task_timeout_secs: higher.task_timeout_secs.or(self.task_timeout_secs),
            max_concurrent_tasks: higher.max_concurrent_tasks.or(self.max_concurrent_tasks),
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
            llm_provider: std::env::var("ALEX_LLM_PROVIDER").ok(),
            llm_base_url: std::env::var("ALEX_LLM_BASE_URL").ok(),
            llm_api_key: std::env::var("ALEX_LLM_API_KEY").ok(),
            llm_model: std::env::var("ALEX_LLM_MODEL").ok(),
            max_iterations: std::env::var("ALEX_MAX_ITERATIONS").ok().and_then(|v| v.parse().ok()),
            tool_preset: std::env::var("ALEX_TOOL_PRESET").ok(),
            compress_threshold: std::env::var("ALEX_COMPRESS_THRESHOLD").ok().and_then(|v| v.parse().ok()),
            task_timeout_secs: std::env::var("ALEX_TASK_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()),
            max_concurrent_tasks: std::env::var("ALEX_MAX_CONCURRENT_TASKS").ok().and_then(|v| v.parse().ok()),
            sessions_root: std::env::var("ALEX_SESSIONS_ROOT").ok().map(PathBuf::from),
        }
    }

    /// Load the user file layer on its own, for `alex config get/set/show`.
    pub fn load_user_layer() -> PartialConfig {
        user_config_path().map(|p| Self::from_file(&p)).unwrap_or_default()
    }

    /// Persist the user file layer back to `~/.alex/config.toml`.
    pub fn save_user_layer(&self) -> anyhow::Result<()> {
        let path = user_config_path().ok_or_else(|| anyhow::anyhow!("could not resolve home directory"))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let serialized = toml::to_string_pretty(self)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub max_iterations: u32,
    pub tool_preset: Preset,
    pub compress_threshold: usize,
    pub task_timeout: Duration,
    pub max_concurrent_tasks: usize,
    pub sessions_root: PathBuf,
}

impl CliConfig {
    /// Merge defaults → `/etc/alex/config.toml` → `~/.alex/config.toml` →
    /// `ALEX_*` env vars → `cli_overrides`.
    pub fn load(cli_overrides: PartialConfig) -> anyhow::Result<Self> {
        let mut merged = PartialConfig::default();
        merged = merged.merge(PartialConfig::from_file(Path::new("/etc/alex/config.toml")));
        merged = merged.merge(PartialConfig::load_user_layer());
        merged = merged.merge(PartialConfig::from_env());
        merged = merged.merge(cli_overrides);
        Self::from_partial(merged)
    }

    fn from_partial(p: PartialConfig) -> anyhow::Result<Self> {
        let tool_preset = match p.tool_preset.as_deref() {
            Some(raw) => raw.parse().map_err(|e: alex_tools::UnknownPreset| anyhow::anyhow!(e))?,
            None => Preset::Full,
        };

        Ok(Self {
            llm_base_url: p.llm_base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            llm_api_key: p.llm_api_key,
            llm_model: p.llm_model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            max_iterations: p.max_iterations.unwrap_or(10),
            tool_preset,
            compress_threshold: p.compress_threshold.unwrap_or(8_000),
            task_timeout: Duration::from_secs(p.task_timeout_secs.unwrap_or(600)),
            max_concurrent_tasks: p.max_concurrent_tasks.unwrap_or(4),
            sessions_root: p.sessions_root.unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".alex").join("sessions"))
                    .unwrap_or_else(|| PathBuf::from("./alex-sessions"))
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_is_overridden() {
        let config = CliConfig::from_partial(PartialConfig::default()).unwrap();
        assert_eq!(config.max_iterations, 10);
        assert!(matches!(config.tool_preset, Preset::Full));
    }

    #[test]
    fn unknown_preset_is_a_config_error() {
        let partial = PartialConfig {
            tool_preset: Some("bogus".to_string()),
            ..Default::default()
        };
        assert!(CliConfig::from_partial(partial).is_err());
    }

    #[test]
    fn a_file_layer_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let partial = PartialConfig {
            llm_model: Some("gpt-4o".to_string()),
            max_iterations: Some(7),
            ..Default::default()
        };
        std::fs::write(&path, toml::to_string_pretty(&partial).unwrap()).unwrap();

        let loaded = PartialConfig::from_file(&path);
        assert_eq!(loaded.llm_model.as_deref(), Some("gpt-4o"));
        assert_eq!(loaded.max_iterations, Some(7));
    }
}
