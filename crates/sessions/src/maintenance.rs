//! Session-store maintenance: staleness pruning, entry-count capping, and
//! disk-budget enforcement. Applied inside [`crate::store::SessionStore::update`]
//! under the write lock, in `warn` (report only) or `enforce` (apply) mode.

use std::collections::HashMap;
use std::path::Path;

use oc_domain::config::MaintenanceMode;
use oc_domain::model::{SessionEntry, SessionKey};

#[derive(Debug, Default, Clone)]
pub struct MaintenanceReport {
    pub pruned_stale: Vec<SessionKey>,
    pub evicted_over_cap: Vec<SessionKey>,
    pub evicted_over_budget: Vec<SessionKey>,
}

impl MaintenanceReport {
    pub fn is_empty(&self) -> bool {
        self.pruned_stale.is_empty() && self.evicted_over_cap.is_empty() && self.evicted_over_budget.is_empty()
    }
}

pub struct MaintenanceParams<'a> {
    pub mode: MaintenanceMode,
    pub prune_after_ms: i64,
    pub max_entries: usize,
    pub disk_budget_bytes: u64,
    pub now_ms: i64,
    /// The session key for the inbound currently being processed — always
    /// exempt from eviction even if it would otherwise qualify.
    pub active_key: Option<&'a SessionKey>,
}

/// Run maintenance over `entries`. In `Warn` mode the map is left
/// untouched and the report describes what *would* be evicted; in
/// `Enforce` mode qualifying entries are removed (and, where a
/// `sessionFile` is recorded, the backing transcript file is deleted).
pub fn run(entries: &mut HashMap<SessionKey, SessionEntry>, params: &MaintenanceParams<'_>) -> MaintenanceReport {
    let mut report = MaintenanceReport::default();

    let stale: Vec<SessionKey> = entries
        .iter()
        .filter(|(k, e)| !is_active(k, params.active_key) && params.now_ms - e.updated_at > params.prune_after_ms)
        .map(|(k, _)| k.clone())
        .collect();
    report.pruned_stale = stale;

    if matches!(params.mode, MaintenanceMode::Enforce) {
        for key in &report.pruned_stale {
            remove_entry(entries, key);
        }
    }

    if entries.len() > params.max_entries {
        let overflow = entries.len() - params.max_entries;
        let mut by_age: Vec<(SessionKey, i64)> = entries
            .iter()
            .filter(|(k, _)| !is_active(k, params.active_key))
            .map(|(k, e)| (k.clone(), e.updated_at))
            .collect();
        by_age.sort_by_key(|(_, updated_at)| *updated_at);
        let victims: Vec<SessionKey> = by_age.into_iter().take(overflow).map(|(k, _)| k).collect();
        report.evicted_over_cap = victims;

        if matches!(params.mode, MaintenanceMode::Enforce) {
            for key in &report.evicted_over_cap {
                remove_entry(entries, key);
            }
        }
    }

    if params.disk_budget_bytes > 0 {
        let total: u64 = entries
            .values()
            .filter_map(|e| e.session_file.as_deref())
            .filter_map(|f| std::fs::metadata(f).ok())
            .map(|m| m.len())
            .sum();

        if total > params.disk_budget_bytes {
            let mut by_age: Vec<(SessionKey, i64)> = entries
                .iter()
                .filter(|(k, _)| !is_active(k, params.active_key))
                .map(|(k, e)| (k.clone(), e.updated_at))
                .collect();
            by_age.sort_by_key(|(_, updated_at)| *updated_at);

            let mut remaining = total;
            for (key, _) in by_age {
                if remaining <= params.disk_budget_bytes {
                    break;
                }
                if let Some(entry) = entries.get(&key) {
                    if let Some(file) = &entry.session_file {
                        if let Ok(meta) = std::fs::metadata(file) {
                            remaining = remaining.saturating_sub(meta.len());
                        }
                    }
                }
                report.evicted_over_budget.push(key);
            }

            if matches!(params.mode, MaintenanceMode::Enforce) {
                for key in &report.evicted_over_budget {
                    if let Some(entry) = entries.get(key) {
                        if let Some(file) = entry.session_file.clone() {
                            let _ = std::fs::remove_file(Path::new(&file));
                        }
                    }
                    remove_entry(entries, key);
                }
            }
        }
    }

    report
}

fn is_active(key: &SessionKey, active: Option<&SessionKey>) -> bool {
    active.is_some_and(|a| a == key)
}

fn remove_entry(entries: &mut HashMap<SessionKey, SessionEntry>, key: &SessionKey) {
    entries.remove(key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn entry(updated_at: i64) -> SessionEntry {
        SessionEntry::new(Uuid::new_v4(), updated_at)
    }

    #[test]
    fn prunes_stale_entries_in_enforce_mode() {
        let mut entries = HashMap::new();
        entries.insert(SessionKey::canonicalize("agent:a:direct:old"), entry(0));
        entries.insert(SessionKey::canonicalize("agent:a:direct:new"), entry(1_000_000));

        let params = MaintenanceParams {
            mode: MaintenanceMode::Enforce,
            prune_after_ms: 500_000,
            max_entries: 100,
            disk_budget_bytes: 0,
            now_ms: 1_000_000,
            active_key: None,
        };
        let report = run(&mut entries, &params);
        assert_eq!(report.pruned_stale.len(), 1);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn warn_mode_reports_but_does_not_mutate() {
        let mut entries = HashMap::new();
        entries.insert(SessionKey::canonicalize("agent:a:direct:old"), entry(0));

        let params = MaintenanceParams {
            mode: MaintenanceMode::Warn,
            prune_after_ms: 1,
            max_entries: 100,
            disk_budget_bytes: 0,
            now_ms: 1_000_000,
            active_key: None,
        };
        let report = run(&mut entries, &params);
        assert_eq!(report.pruned_stale.len(), 1);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn active_key_is_always_exempt() {
        let mut entries = HashMap::new();
        let active = SessionKey::canonicalize("agent:a:direct:active");
        entries.insert(active.clone(), entry(0));

        let params = MaintenanceParams {
            mode: MaintenanceMode::Enforce,
            prune_after_ms: 1,
            max_entries: 100,
            disk_budget_bytes: 0,
            now_ms: 1_000_000,
            active_key: Some(&active),
        };
        let report = run(&mut entries, &params);
        assert!(report.pruned_stale.is_empty());
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn caps_to_max_entries_evicting_oldest() {
        let mut entries = HashMap::new();
        for i in 0..5 {
            entries.insert(
                SessionKey::canonicalize(&format!("agent:a:direct:p{i}")),
                entry(i as i64 * 1000),
            );
        }

        let params = MaintenanceParams {
            mode: MaintenanceMode::Enforce,
            prune_after_ms: i64::MAX,
            max_entries: 3,
            disk_budget_bytes: 0,
            now_ms: 10_000,
            active_key: None,
        };
        let report = run(&mut entries, &params);
        assert_eq!(report.evicted_over_cap.len(), 2);
        assert_eq!(entries.len(), 3);
        assert!(!entries.contains_key(&SessionKey::canonicalize("agent:a:direct:p0")));
        assert!(!entries.contains_key(&SessionKey::canonicalize("agent:a:direct:p1")));
    }
}
