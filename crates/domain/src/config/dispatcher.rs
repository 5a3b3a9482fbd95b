use serde::{Deserialize, Serialize};

use super::error::ConfigError;

fn d_run_timeout_ms() -> i64 {
    10 * 60 * 1000 // 10 min
}

fn d_prompt_size_guard_bytes() -> usize {
    2 * 1024 * 1024 // 2 MiB
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub run_timeout_ms: i64,
    pub prompt_size_guard_bytes: usize,
    /// Fixed-window limiter for session creation: max requests per window.
    pub session_create_rate_limit: u32,
    pub session_create_rate_window_ms: i64,
    /// `*` allows any agent to spawn sub-agents; otherwise an explicit list.
    pub allow_agents: Vec<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            run_timeout_ms: d_run_timeout_ms(),
            prompt_size_guard_bytes: d_prompt_size_guard_bytes(),
            session_create_rate_limit: 120,
            session_create_rate_window_ms: 10_000,
            allow_agents: Vec::new(),
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.run_timeout_ms <= 0 {
            errors.push(ConfigError::error("dispatcher.run_timeout_ms", "must be positive"));
        }
        if self.prompt_size_guard_bytes == 0 {
            errors.push(ConfigError::error(
                "dispatcher.prompt_size_guard_bytes",
                "must be greater than zero",
            ));
        }
        if self.session_create_rate_limit == 0 {
            errors.push(ConfigError::warning(
                "dispatcher.session_create_rate_limit",
                "zero permits no new sessions at all",
            ));
        }
        errors
    }
}
