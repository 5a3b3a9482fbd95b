//! Session store: a single JSON file per agent mapping
//! [`SessionKey`]→[`SessionEntry`], mutated exclusively under the file
//! lock in [`crate::lock`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::Utc;
use oc_domain::config::{MaintenanceMode, SessionsConfig};
use oc_domain::error::Result;
use oc_domain::model::{Ctx, SessionEntry, SessionKey};
use oc_domain::trace::TraceEvent;
use parking_lot::RwLock as SyncRwLock;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::lock::{self, LockOptions};
use crate::maintenance::{self, MaintenanceParams};

type SessionMap = HashMap<SessionKey, SessionEntry>;

struct CacheEntry {
    mtime: Option<SystemTime>,
    data: SessionMap,
}

/// Options threaded through [`SessionStore::update`] controlling whether
/// maintenance runs and, if so, which key is exempt as "active".
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub run_maintenance: bool,
    pub active_key: Option<SessionKey>,
}

pub struct SessionStore {
    cfg: SessionsConfig,
    /// Per-canonical-path cache entry, behind an async mutex so concurrent
    /// readers of the same path share one load instead of racing the disk.
    cache: SyncRwLock<HashMap<PathBuf, Arc<AsyncMutex<Option<CacheEntry>>>>>,
}

impl SessionStore {
    pub fn new(cfg: SessionsConfig) -> Self {
        Self {
            cfg,
            cache: SyncRwLock::new(HashMap::new()),
        }
    }

    /// Compute the session-store path for `agent_id`, honoring an explicit
    /// `hint` (e.g. a CLI override or per-agent config) when present.
    pub fn resolve_store_path(&self, hint: Option<&Path>, agent_id: &str) -> PathBuf {
        if let Some(hint) = hint {
            return hint.to_path_buf();
        }
        let base = Path::new(&self.cfg.store_path);
        if base.is_absolute() || base.parent().map(|p| !p.as_os_str().is_empty()).unwrap_or(false) {
            return base.to_path_buf();
        }
        PathBuf::from(format!("data/sessions/{agent_id}.json"))
    }

    fn slot(&self, path: &Path) -> Arc<AsyncMutex<Option<CacheEntry>>> {
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if let Some(existing) = self.cache.read().get(&canonical) {
            return existing.clone();
        }
        let mut guard = self.cache.write();
        guard
            .entry(canonical)
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }

    /// Load the full session map for `path`, reusing the in-memory cache
    /// when the file's mtime has not changed since the last load.
    pub async fn load(&self, path: &Path) -> Result<SessionMap> {
        let slot = self.slot(path);
        let mut guard = slot.lock().await;
        let disk_mtime = std::fs::metadata(path).ok().and_then(|m| m.modified().ok());

        if let Some(cached) = guard.as_ref() {
            if cached.mtime == disk_mtime {
                return Ok(cached.data.clone());
            }
        }

        let data = read_map_from_disk(path)?;
        *guard = Some(CacheEntry {
            mtime: disk_mtime,
            data: data.clone(),
        });
        Ok(data)
    }

    /// Mutate the session map for `path` under the write lock, optionally
    /// running maintenance, then persist and refresh the cache.
    pub async fn update<F, T>(&self, path: &Path, options: UpdateOptions, mutator: F) -> Result<T>
    where
        F: FnOnce(&mut SessionMap) -> T,
    {
        let lock_opts = LockOptions {
            stale_ms: self.cfg.stale_ms,
            timeout_ms: self.cfg.lock_timeout_ms,
        };
        let _guard = lock::acquire(path, &lock_opts).await?;

        // Reload inside the critical section: another process may have
        // written since our last cached read (optimistic reconciliation).
        let mut data = read_map_from_disk(path).unwrap_or_default();

        let result = mutator(&mut data);

        if options.run_maintenance {
            let params = MaintenanceParams {
                mode: self.cfg.maintenance_mode,
                prune_after_ms: self.cfg.prune_after_ms,
                max_entries: self.cfg.max_entries,
                disk_budget_bytes: self.cfg.disk_budget_bytes,
                now_ms: Utc::now().timestamp_millis(),
                active_key: options.active_key.as_ref(),
            };
            let report = maintenance::run(&mut data, &params);
            if !report.is_empty() && matches!(self.cfg.maintenance_mode, MaintenanceMode::Warn) {
                tracing::warn!(
                    pruned = report.pruned_stale.len(),
                    over_cap = report.evicted_over_cap.len(),
                    over_budget = report.evicted_over_budget.len(),
                    "session store maintenance would evict entries (warn mode)"
                );
            }
        }

        write_map_to_disk(path, &data)?;

        let slot = self.slot(path);
        let mut guard = slot.lock().await;
        let mtime = std::fs::metadata(path).ok().and_then(|m| m.modified().ok());
        *guard = Some(CacheEntry { mtime, data });

        Ok(result)
    }

    /// Record an inbound message against `key`, creating a fresh entry on
    /// first contact. Returns the resulting entry and whether it is new.
    pub async fn record_inbound(&self, path: &Path, key: &SessionKey, ctx: &Ctx) -> Result<(SessionEntry, bool)> {
        let key_owned = key.clone();
        self.update(
            path,
            UpdateOptions {
                run_maintenance: true,
                active_key: Some(key_owned.clone()),
            },
            move |data| {
                let now_ms = Utc::now().timestamp_millis();
                let is_new = !data.contains_key(&key_owned);
                let entry = data
                    .entry(key_owned.clone())
                    .or_insert_with(|| SessionEntry::new(Uuid::new_v4(), now_ms));

                entry.updated_at = entry.updated_at.max(now_ms);
                entry.last_channel = Some(ctx.provider.clone());
                entry.last_to = Some(ctx.to.clone());
                entry.last_provider = Some(ctx.provider.clone());
                entry.chat_type = Some(ctx.chat_type);

                TraceEvent::SessionResolved {
                    session_key: key_owned.as_str().to_string(),
                    session_id: entry.session_id.to_string(),
                    is_new,
                }
                .emit();

                (entry.clone(), is_new)
            },
        )
        .await
    }

    /// Read the last `updatedAt` for `key` without mutating the store, used
    /// to format envelopes before the orchestrator finalizes a new context.
    pub async fn read_updated_at(&self, path: &Path, key: &SessionKey) -> Result<Option<i64>> {
        let data = self.load(path).await?;
        Ok(data.get(key).map(|e| e.updated_at))
    }

    /// Explicit session reset: assigns a fresh `sessionId`, bumping
    /// `updatedAt`, preserving channel/routing metadata.
    pub async fn reset_session(&self, path: &Path, key: &SessionKey, reason: &str) -> Result<SessionEntry> {
        let key_owned = key.clone();
        let reason = reason.to_string();
        self.update(
            path,
            UpdateOptions {
                run_maintenance: false,
                active_key: Some(key_owned.clone()),
            },
            move |data| {
                let now_ms = Utc::now().timestamp_millis();
                let old_id = data.get(&key_owned).map(|e| e.session_id.to_string()).unwrap_or_default();
                let entry = data
                    .entry(key_owned.clone())
                    .or_insert_with(|| SessionEntry::new(Uuid::new_v4(), now_ms));
                entry.session_id = Uuid::new_v4();
                entry.updated_at = now_ms;

                TraceEvent::SessionReset {
                    session_key: key_owned.as_str().to_string(),
                    old_session_id: old_id,
                    new_session_id: entry.session_id.to_string(),
                    reason: reason.clone(),
                }
                .emit();

                entry.clone()
            },
        )
        .await
    }
}

fn read_map_from_disk(path: &Path) -> Result<SessionMap> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_map_to_disk(path: &Path, data: &SessionMap) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(data)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_domain::model::{ChatType, MsgContext};

    fn test_ctx(key: SessionKey) -> Ctx {
        MsgContext {
            body: "hi".into(),
            raw_body: "hi".into(),
            command_body: None,
            from: "+15550001111".into(),
            to: "bot".into(),
            session_key: key,
            account_id: None,
            chat_type: ChatType::Direct,
            provider: "telegram".into(),
            surface: None,
            originating_channel: None,
            originating_to: None,
            message_sid: "msg-1".into(),
            sender_id: "+15550001111".into(),
            sender_name: None,
            was_mentioned: false,
            command_authorized: false,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn record_inbound_creates_then_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let store = SessionStore::new(SessionsConfig::default());
        let key = SessionKey::canonicalize("agent:bot:direct:alice");

        let (entry1, is_new1) = store.record_inbound(&path, &key, &test_ctx(key.clone())).await.unwrap();
        assert!(is_new1);

        let (entry2, is_new2) = store.record_inbound(&path, &key, &test_ctx(key.clone())).await.unwrap();
        assert!(!is_new2);
        assert_eq!(entry1.session_id, entry2.session_id);
        assert!(entry2.updated_at >= entry1.updated_at);
    }

    #[tokio::test]
    async fn updated_at_is_monotonic_across_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let store = SessionStore::new(SessionsConfig::default());
        let key = SessionKey::canonicalize("agent:bot:direct:alice");

        let mut last = 0i64;
        for _ in 0..5 {
            let (entry, _) = store.record_inbound(&path, &key, &test_ctx(key.clone())).await.unwrap();
            assert!(entry.updated_at >= last);
            last = entry.updated_at;
        }
    }

    #[tokio::test]
    async fn reset_session_assigns_new_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let store = SessionStore::new(SessionsConfig::default());
        let key = SessionKey::canonicalize("agent:bot:direct:alice");

        let (before, _) = store.record_inbound(&path, &key, &test_ctx(key.clone())).await.unwrap();
        let after = store.reset_session(&path, &key, "daily-reset").await.unwrap();
        assert_ne!(before.session_id, after.session_id);
    }

    #[tokio::test]
    async fn cache_reused_when_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let store = SessionStore::new(SessionsConfig::default());
        let key = SessionKey::canonicalize("agent:bot:direct:alice");

        store.record_inbound(&path, &key, &test_ctx(key.clone())).await.unwrap();
        let first_load = store.load(&path).await.unwrap();
        let second_load = store.load(&path).await.unwrap();
        assert_eq!(first_load.len(), second_load.len());
    }
}
