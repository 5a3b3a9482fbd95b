use serde::{Deserialize, Serialize};

use super::error::ConfigError;

fn d_ttl_ms() -> i64 {
    60 * 60 * 1000 // 1 h
}

fn d_pending_cap() -> usize {
    3
}

fn d_grace_ms() -> i64 {
    30_000
}

fn d_max_code_attempts() -> u32 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    pub ttl_ms: i64,
    pub pending_cap_per_channel: usize,
    /// Inbound messages older than `connectedAt - pairing_grace_ms` never
    /// trigger a pairing reply (historical-backlog suppression).
    pub pairing_grace_ms: i64,
    pub max_code_generation_attempts: u32,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            ttl_ms: d_ttl_ms(),
            pending_cap_per_channel: d_pending_cap(),
            pairing_grace_ms: d_grace_ms(),
            max_code_generation_attempts: d_max_code_attempts(),
        }
    }
}

impl PairingConfig {
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.ttl_ms <= 0 {
            errors.push(ConfigError::error("pairing.ttl_ms", "must be positive"));
        }
        if self.pending_cap_per_channel == 0 {
            errors.push(ConfigError::error(
                "pairing.pending_cap_per_channel",
                "must be greater than zero",
            ));
        }
        errors
    }
}
