//! Periodic background tasks spawned once at startup, grounded in the
//! teacher's `main.rs` pattern of several `tokio::spawn` interval loops
//! hung off `AppState` (session flush, delivery flush, lock pruning, stale
//! node pruning).
//!
//! Three sweeps run here:
//! - the session-lock watchdog, force-releasing `.lock` files held beyond
//!   `sessions.max_hold_ms` even with nobody currently contending for them
//!   (spec.md §4.1, §5) — [`oc_sessions::lock`] only reclaims staleness
//!   when a second acquirer contends, so an independent disk scan is the
//!   only way to catch a lock abandoned by a crashed process that nobody
//!   else is waiting on;
//! - auth-profile cooldown clearing, so a profile that served its cooldown
//!   becomes selectable again without waiting for the next failed pick;
//! - pairing TTL pruning, piggybacked on `list_requests`' own prune-on-read
//!   by touching every configured channel on a timer instead of waiting for
//!   the next inbound message to do it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use oc_auth_profiles::Selector;
use oc_orchestrator::InboundOrchestrator;

/// Scan `dir` for `*.lock` files and force-release any whose `createdAt`
/// exceeds `max_hold_ms`, regardless of whether the holding pid is still
/// alive. Returns the number of locks released.
pub fn sweep_stale_locks(dir: &Path, max_hold_ms: i64) -> usize {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return 0;
    };
    let now = Utc::now();
    let mut released = 0;

    for entry in read_dir.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("lock") {
            continue;
        }
        let Ok(raw) = std::fs::read_to_string(&path) else {
            continue;
        };
        let Ok(payload) = serde_json::from_str::<oc_sessions::lock::LockPayload>(&raw) else {
            // Unparseable payload: same "stale by definition" rule the
            // on-contention reclaim path uses.
            let _ = std::fs::remove_file(&path);
            released += 1;
            continue;
        };
        let age_ms = (now - payload.created_at).num_milliseconds();
        if age_ms > max_hold_ms {
            tracing::warn!(
                path = %path.display(),
                held_pid = payload.pid,
                age_ms,
                "watchdog force-releasing session lock held beyond max_hold_ms"
            );
            let _ = std::fs::remove_file(&path);
            released += 1;
        }
    }
    released
}

/// Spawn the watchdog loop that sweeps `state_dir` (and its `sessions`/
/// `pairing`/`auth-profiles` subpaths) every `interval` for abandoned
/// locks, matching the spec's 60s default cadence.
pub fn spawn_lock_watchdog(state_dir: PathBuf, max_hold_ms: i64, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for dir in [state_dir.join("sessions"), state_dir.join("pairing"), state_dir.clone()] {
                let released = sweep_stale_locks(&dir, max_hold_ms);
                if released > 0 {
                    tracing::info!(dir = %dir.display(), released, "lock watchdog swept stale locks");
                }
            }
        }
    });
}

/// Spawn the periodic auth-profile cooldown-clearing sweep.
pub fn spawn_cooldown_sweep(orchestrator: Arc<InboundOrchestrator>, selector_cfg: oc_domain::config::AuthProfilesConfig, interval: Duration) {
    tokio::spawn(async move {
        let selector = Selector::new(selector_cfg);
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            match orchestrator.auth_profiles().load_all().await {
                Ok(profiles) => {
                    for profile in profiles {
                        if profile.usage_stats.cooldown_until.is_some_and(|until| now >= until) {
                            let _ = orchestrator
                                .auth_profiles()
                                .update_usage(&profile.id, |stats| selector.clear_expired_cooldowns(stats, now))
                                .await;
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "auth-profile cooldown sweep failed to load profiles"),
            }
        }
    });
}

/// Spawn the periodic pairing TTL sweep across every configured channel.
pub fn spawn_pairing_sweep(orchestrator: Arc<InboundOrchestrator>, channels: Vec<String>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for channel in &channels {
                if let Err(e) = orchestrator.pairing().list_requests(channel, None).await {
                    tracing::warn!(channel, error = %e, "pairing TTL sweep failed");
                }
            }
        }
    });
}
