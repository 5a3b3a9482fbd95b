//! Auth-profile selection, success/failure feedback, and cooldown sweeping
//! (spec.md §4.8).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use oc_domain::config::AuthProfilesConfig;
use oc_domain::model::{AuthProfile, FailureReason, UsageStats};
use oc_domain::trace::TraceEvent;

use crate::backoff;

/// Result of [`Selector::select`].
#[derive(Debug, Clone)]
pub enum SelectOutcome {
    Selected(AuthProfile),
    /// Every candidate is unusable. `reason` is the best-guess cause,
    /// `retry_at` the earliest moment any candidate becomes usable again.
    AllUnusable {
        reason: FailureReason,
        retry_at: DateTime<Utc>,
    },
    /// No profile at all is configured for the provider.
    NoProfiles,
}

pub struct Selector {
    cfg: AuthProfilesConfig,
}

impl Selector {
    pub fn new(cfg: AuthProfilesConfig) -> Self {
        Self { cfg }
    }

    /// Select the first usable candidate in provider order (the order
    /// `candidates` is already sorted in by the store). When
    /// `provider` is in `bypass_providers`, the first candidate is
    /// returned unconditionally without checking `unusableUntil`.
    pub fn select(&self, provider: &str, candidates: &[AuthProfile], now: DateTime<Utc>) -> SelectOutcome {
        if candidates.is_empty() {
            return SelectOutcome::NoProfiles;
        }

        if self.cfg.bypass_providers.iter().any(|p| p == provider) {
            return SelectOutcome::Selected(candidates[0].clone());
        }

        if let Some(usable) = candidates.iter().find(|p| !p.is_unusable(now)) {
            return SelectOutcome::Selected(usable.clone());
        }

        let retry_at = candidates
            .iter()
            .filter_map(|p| p.usage_stats.unusable_until())
            .min()
            .unwrap_or(now);

        SelectOutcome::AllUnusable {
            reason: score_reason(candidates),
            retry_at,
        }
    }

    /// Reset on success: clears `errorCount`, `failureCounts`, and both
    /// cooldown/disable windows.
    pub fn mark_used(&self, stats: &mut UsageStats, now: DateTime<Utc>) {
        stats.last_used = Some(now);
        stats.error_count = 0;
        stats.failure_counts.clear();
        stats.cooldown_until = None;
        stats.disabled_until = None;
        stats.disabled_reason = None;
    }

    /// Record a failure. Window-decays stale counters first, then applies
    /// billing disablement or cooldown backoff — but never extends an
    /// already-active window.
    pub fn mark_failure(&self, profile_id: &str, provider: &str, stats: &mut UsageStats, reason: FailureReason, now: DateTime<Utc>) {
        if let Some(last) = stats.last_failure_at {
            if (now - last).num_milliseconds() > self.cfg.failure_window_ms {
                stats.error_count = 0;
                stats.failure_counts.clear();
            }
        }

        let already_active = stats.is_unusable(now);

        stats.error_count += 1;
        *stats.failure_counts.entry(reason).or_insert(0) += 1;
        stats.last_failure_at = Some(now);

        if already_active {
            return;
        }

        if reason == FailureReason::Billing {
            let (base_ms, max_ms) = self
                .cfg
                .billing_backoff_overrides
                .get(provider)
                .map(|o| (o.base_ms, o.max_ms))
                .unwrap_or((self.cfg.billing_backoff_base_ms, self.cfg.billing_backoff_max_ms));
            let billing_count = stats.failure_counts.get(&FailureReason::Billing).copied().unwrap_or(1);
            let until = backoff::billing_disabled_until(now, billing_count, base_ms, max_ms);
            stats.disabled_until = Some(until);
            stats.disabled_reason = Some(reason);

            TraceEvent::AuthProfileDisabled {
                profile_id: profile_id.to_string(),
                until,
            }
            .emit();
        } else {
            let until = backoff::cooldown_until(now, stats.error_count);
            stats.cooldown_until = Some(until);

            TraceEvent::AuthProfileCooldown {
                profile_id: profile_id.to_string(),
                reason: format!("{reason:?}"),
                until,
            }
            .emit();
        }
    }

    /// Clear windows that have expired; when nothing remains active, reset
    /// `errorCount`/`failureCounts` but preserve `lastFailureAt` (it still
    /// feeds the next window-decay check).
    pub fn clear_expired_cooldowns(&self, stats: &mut UsageStats, now: DateTime<Utc>) {
        if let Some(until) = stats.cooldown_until {
            if now >= until {
                stats.cooldown_until = None;
            }
        }
        if let Some(until) = stats.disabled_until {
            if now >= until {
                stats.disabled_until = None;
                stats.disabled_reason = None;
            }
        }
        if stats.cooldown_until.is_none() && stats.disabled_until.is_none() {
            stats.error_count = 0;
            stats.failure_counts.clear();
        }
    }
}

/// Score a best-guess `FailureReason` across all-unusable candidates: an
/// active `disabledReason` dominates (weight 1000), otherwise the most
/// frequent failure count wins, otherwise default to `rate_limit`. Ties
/// broken by [`FailureReason::priority_rank`].
fn score_reason(candidates: &[AuthProfile]) -> FailureReason {
    if let Some(reason) = candidates.iter().find_map(|p| p.usage_stats.disabled_reason) {
        return reason;
    }

    let mut totals: HashMap<FailureReason, u32> = HashMap::new();
    for p in candidates {
        for (reason, count) in &p.usage_stats.failure_counts {
            *totals.entry(*reason).or_insert(0) += count;
        }
    }

    totals
        .into_iter()
        .max_by(|(ra, ca), (rb, cb)| ca.cmp(cb).then_with(|| rb.priority_rank().cmp(&ra.priority_rank())))
        .map(|(reason, _)| reason)
        .unwrap_or(FailureReason::RateLimit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn profile_with(id: &str, stats: UsageStats) -> AuthProfile {
        AuthProfile {
            id: id.to_string(),
            provider: "anthropic".to_string(),
            kind: oc_domain::model::AuthProfileType::ApiKey,
            credentials: serde_json::json!({}),
            usage_stats: stats,
        }
    }

    #[test]
    fn selects_first_usable_profile() {
        let selector = Selector::new(AuthProfilesConfig::default());
        let now = Utc::now();
        let mut busy = UsageStats::default();
        busy.cooldown_until = Some(now + Duration::minutes(5));
        let candidates = vec![profile_with("a", busy), profile_with("b", UsageStats::default())];

        match selector.select("anthropic", &candidates, now) {
            SelectOutcome::Selected(p) => assert_eq!(p.id, "b"),
            other => panic!("expected Selected, got {other:?}"),
        }
    }

    #[test]
    fn bypass_provider_ignores_cooldown() {
        let selector = Selector::new(AuthProfilesConfig::default());
        let now = Utc::now();
        let mut busy = UsageStats::default();
        busy.cooldown_until = Some(now + Duration::minutes(5));
        let candidates = vec![profile_with("a", busy)];

        match selector.select("openrouter", &candidates, now) {
            SelectOutcome::Selected(p) => assert_eq!(p.id, "a"),
            other => panic!("expected Selected, got {other:?}"),
        }
    }

    #[test]
    fn all_unusable_reports_soonest_retry() {
        let selector = Selector::new(AuthProfilesConfig::default());
        let now = Utc::now();
        let mut a = UsageStats::default();
        a.cooldown_until = Some(now + Duration::minutes(10));
        let mut b = UsageStats::default();
        b.cooldown_until = Some(now + Duration::minutes(2));
        let candidates = vec![profile_with("a", a), profile_with("b", b)];

        match selector.select("anthropic", &candidates, now) {
            SelectOutcome::AllUnusable { retry_at, .. } => {
                assert_eq!(retry_at, now + Duration::minutes(2));
            }
            other => panic!("expected AllUnusable, got {other:?}"),
        }
    }

    #[test]
    fn mark_failure_then_mark_used_resets_everything() {
        let selector = Selector::new(AuthProfilesConfig::default());
        let now = Utc::now();
        let mut stats = UsageStats::default();

        for _ in 0..3 {
            selector.mark_failure("anthropic:a", "anthropic", &mut stats, FailureReason::Billing, now);
        }
        assert!(stats.disabled_until.is_some());
        assert_eq!(stats.failure_counts.get(&FailureReason::Billing), Some(&1));

        selector.mark_used(&mut stats, now);
        assert_eq!(stats.error_count, 0);
        assert!(stats.failure_counts.is_empty());
        assert!(stats.cooldown_until.is_none());
        assert!(stats.disabled_until.is_none());
        assert!(stats.disabled_reason.is_none());
    }

    #[test]
    fn active_window_is_not_extended_by_a_second_failure() {
        let selector = Selector::new(AuthProfilesConfig::default());
        let now = Utc::now();
        let mut stats = UsageStats::default();

        selector.mark_failure("a", "anthropic", &mut stats, FailureReason::RateLimit, now);
        let first_until = stats.cooldown_until.unwrap();

        selector.mark_failure("a", "anthropic", &mut stats, FailureReason::RateLimit, now + Duration::seconds(1));
        assert_eq!(stats.cooldown_until.unwrap(), first_until);
        // errorCount still increments even though the window isn't extended.
        assert_eq!(stats.error_count, 2);
    }

    #[test]
    fn window_decay_resets_counters_after_failure_window_elapses() {
        let mut cfg = AuthProfilesConfig::default();
        cfg.failure_window_ms = 1000;
        let selector = Selector::new(cfg);
        let now = Utc::now();
        let mut stats = UsageStats::default();

        selector.mark_failure("a", "anthropic", &mut stats, FailureReason::Timeout, now);
        assert_eq!(stats.error_count, 1);

        let later = now + Duration::milliseconds(5000);
        selector.mark_failure("a", "anthropic", &mut stats, FailureReason::Timeout, later);
        // Decayed back to a fresh count of 1, not 2.
        assert_eq!(stats.error_count, 1);
    }

    #[test]
    fn clear_expired_cooldowns_resets_counters_but_keeps_last_failure_at() {
        let selector = Selector::new(AuthProfilesConfig::default());
        let now = Utc::now();
        let mut stats = UsageStats::default();
        selector.mark_failure("a", "anthropic", &mut stats, FailureReason::Unknown, now);

        let after = now + Duration::hours(2);
        selector.clear_expired_cooldowns(&mut stats, after);

        assert!(stats.cooldown_until.is_none());
        assert_eq!(stats.error_count, 0);
        assert!(stats.last_failure_at.is_some());
    }
}
