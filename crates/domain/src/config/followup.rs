use serde::{Deserialize, Serialize};

use super::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowupMode {
    Collect,
    Latest,
    Interrupt,
}

impl Default for FollowupMode {
    fn default() -> Self {
        FollowupMode::Collect
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DropPolicy {
    Summarize,
    DropOldest,
    Reject,
}

impl Default for DropPolicy {
    fn default() -> Self {
        DropPolicy::DropOldest
    }
}

fn d_debounce_ms() -> i64 {
    1500
}

fn d_cap() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowupConfig {
    pub mode: FollowupMode,
    pub debounce_ms: i64,
    pub cap: usize,
    pub drop_policy: DropPolicy,
}

impl Default for FollowupConfig {
    fn default() -> Self {
        Self {
            mode: FollowupMode::default(),
            debounce_ms: d_debounce_ms(),
            cap: d_cap(),
            drop_policy: DropPolicy::default(),
        }
    }
}

impl FollowupConfig {
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.cap == 0 {
            errors.push(ConfigError::error("followup.cap", "must be greater than zero"));
        }
        if self.debounce_ms < 0 {
            errors.push(ConfigError::error("followup.debounce_ms", "must not be negative"));
        }
        errors
    }
}
