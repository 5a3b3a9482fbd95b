use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

fn d_store_path() -> String {
    "auth-profiles.json".into()
}

fn d_failure_window_ms() -> i64 {
    60 * 60 * 1000 // 1 h
}

fn d_billing_base_ms() -> i64 {
    5 * 60 * 60 * 1000 // 5 h
}

fn d_billing_max_ms() -> i64 {
    24 * 60 * 60 * 1000 // 24 h
}

/// Per-provider override of the billing backoff envelope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BillingBackoffOverride {
    pub base_ms: i64,
    pub max_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthProfilesConfig {
    pub store_path: String,
    pub failure_window_ms: i64,
    pub billing_backoff_base_ms: i64,
    pub billing_backoff_max_ms: i64,
    pub billing_backoff_overrides: HashMap<String, BillingBackoffOverride>,
    /// Providers selected without checking `unusableUntil` at all.
    pub bypass_providers: Vec<String>,
}

impl Default for AuthProfilesConfig {
    fn default() -> Self {
        Self {
            store_path: d_store_path(),
            failure_window_ms: d_failure_window_ms(),
            billing_backoff_base_ms: d_billing_base_ms(),
            billing_backoff_max_ms: d_billing_max_ms(),
            billing_backoff_overrides: HashMap::new(),
            bypass_providers: vec!["openrouter".into()],
        }
    }
}

impl AuthProfilesConfig {
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.billing_backoff_base_ms <= 0 || self.billing_backoff_max_ms <= 0 {
            errors.push(ConfigError::error(
                "auth_profiles.billing_backoff",
                "base_ms and max_ms must be positive",
            ));
        }
        if self.billing_backoff_base_ms > self.billing_backoff_max_ms {
            errors.push(ConfigError::error(
                "auth_profiles.billing_backoff_base_ms",
                "base_ms must not exceed max_ms",
            ));
        }
        errors
    }
}
