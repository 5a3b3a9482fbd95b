use serde::{Deserialize, Serialize};

use super::error::ConfigError;

fn d_memory_cap() -> usize {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AbortConfig {
    /// Max distinct session keys retained in the abort-memory LRU.
    pub memory_cap: usize,
    /// Additional phrases appended to the built-in multilingual vocabulary.
    pub extra_phrases: Vec<String>,
}

impl Default for AbortConfig {
    fn default() -> Self {
        Self {
            memory_cap: d_memory_cap(),
            extra_phrases: Vec::new(),
        }
    }
}

impl AbortConfig {
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.memory_cap == 0 {
            errors.push(ConfigError::error("abort.memory_cap", "must be greater than zero"));
        }
        errors
    }
}
