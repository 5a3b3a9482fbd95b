use serde::{Deserialize, Serialize};

use crate::model::DmScope;

use super::error::ConfigError;

fn d_store_path() -> String {
    "sessions.json".into()
}

fn d_prune_after_ms() -> i64 {
    30 * 24 * 60 * 60 * 1000 // 30 days
}

fn d_max_entries() -> usize {
    10_000
}

fn d_disk_budget_bytes() -> u64 {
    2 * 1024 * 1024 * 1024 // 2 GiB
}

fn d_stale_ms() -> i64 {
    30 * 60 * 1000 // 30 min
}

fn d_max_hold_ms() -> i64 {
    5 * 60 * 1000 // 5 min
}

fn d_lock_timeout_ms() -> i64 {
    10_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceMode {
    Warn,
    Enforce,
}

impl Default for MaintenanceMode {
    fn default() -> Self {
        MaintenanceMode::Enforce
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub store_path: String,
    pub dm_scope: DmScope,
    pub prune_after_ms: i64,
    pub max_entries: usize,
    pub disk_budget_bytes: u64,
    pub maintenance_mode: MaintenanceMode,
    /// Lock considered stale after this many ms with no heartbeat.
    pub stale_ms: i64,
    /// Watchdog force-releases a lock held longer than this.
    pub max_hold_ms: i64,
    /// How long a writer retries acquiring the lock before giving up.
    pub lock_timeout_ms: i64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            store_path: d_store_path(),
            dm_scope: DmScope::default(),
            prune_after_ms: d_prune_after_ms(),
            max_entries: d_max_entries(),
            disk_budget_bytes: d_disk_budget_bytes(),
            maintenance_mode: MaintenanceMode::default(),
            stale_ms: d_stale_ms(),
            max_hold_ms: d_max_hold_ms(),
            lock_timeout_ms: d_lock_timeout_ms(),
        }
    }
}

impl SessionsConfig {
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.store_path.trim().is_empty() {
            errors.push(ConfigError::error("sessions.store_path", "must not be empty"));
        }
        if self.max_entries == 0 {
            errors.push(ConfigError::error("sessions.max_entries", "must be greater than zero"));
        }
        if self.max_hold_ms <= 0 {
            errors.push(ConfigError::error("sessions.max_hold_ms", "must be positive"));
        }
        if self.stale_ms <= self.max_hold_ms {
            errors.push(ConfigError::warning(
                "sessions.stale_ms",
                "stale_ms should exceed max_hold_ms or the watchdog and stale-reclamation paths race",
            ));
        }
        errors
    }
}
