//! Auth-profile store types: credentials plus rolling usage/failure stats
//! consumed by the auth-profile selector.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a profile's last call failed. Ordered by selector tie-break
/// priority: `auth` first, `unknown` last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Auth,
    Billing,
    Format,
    ModelNotFound,
    Timeout,
    RateLimit,
    Unknown,
}

impl FailureReason {
    /// Tie-break order used when scoring `reason` for an all-profiles-unusable
    /// report: `{auth, billing, format, model_not_found, timeout, rate_limit, unknown}`.
    pub const PRIORITY: [FailureReason; 7] = [
        FailureReason::Auth,
        FailureReason::Billing,
        FailureReason::Format,
        FailureReason::ModelNotFound,
        FailureReason::Timeout,
        FailureReason::RateLimit,
        FailureReason::Unknown,
    ];

    pub fn priority_rank(self) -> usize {
        Self::PRIORITY.iter().position(|r| *r == self).unwrap_or(Self::PRIORITY.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProfileType {
    Oauth,
    ApiKey,
}

/// Rolling usage and failure bookkeeping for one auth profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_count: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub disabled_until: Option<DateTime<Utc>>,
    pub disabled_reason: Option<FailureReason>,
    #[serde(default)]
    pub failure_counts: HashMap<FailureReason, u32>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl UsageStats {
    /// `now < max(cooldownUntil, disabledUntil)`.
    pub fn is_unusable(&self, now: DateTime<Utc>) -> bool {
        let cooldown = self.cooldown_until.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let disabled = self.disabled_until.unwrap_or(DateTime::<Utc>::MIN_UTC);
        now < cooldown.max(disabled)
    }

    pub fn unusable_until(&self) -> Option<DateTime<Utc>> {
        match (self.cooldown_until, self.disabled_until) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }
}

/// A single configured credential set for an upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthProfile {
    /// `"<provider>:<label>"`.
    pub id: String,
    pub provider: String,
    #[serde(rename = "type")]
    pub kind: AuthProfileType,
    pub credentials: serde_json::Value,
    #[serde(default)]
    pub usage_stats: UsageStats,
}

impl AuthProfile {
    pub fn is_unusable(&self, now: DateTime<Utc>) -> bool {
        self.usage_stats.is_unusable(now)
    }
}
