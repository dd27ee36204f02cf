use alex_tools::Preset;

/// Tunable engine policy, assembled by the layered config in `alex-server`/
/// `alex-cli` (spec §6's recognized config keys) and threaded through
/// unchanged from there.
#[derive(Debug, Clone)]
pub struct EnginePolicy {
    pub max_iterations: u32,
    pub tool_preset: Preset,
    pub tool_result_truncate: usize,
    pub tool_force_kill_grace: std::time::Duration,
    pub compress_threshold: usize,
    pub task_timeout: std::time::Duration,
    pub max_concurrent_tasks: usize,
    pub model: String,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tool_preset: Preset::Full,
            tool_result_truncate: 16 * 1024,
            tool_force_kill_grace: std::time::Duration::from_secs(5),
            compress_threshold: 8_000,
            task_timeout: std::time::Duration::from_secs(600),
            max_concurrent_tasks: 4,
            model: "default".to_string(),
        }
    }
}
