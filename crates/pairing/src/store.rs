//! On-disk pairing requests and allowlists.
//!
//! Requests for one channel live in `<base>/<channel>-pairing.json`.
//! Allowlists live in `<base>/<channel>-<account>-allowFrom.json` when
//! scoped to an account, or `<base>/<channel>-allowFrom.json` for the
//! legacy unscoped form. Both file kinds are read/written under the same
//! exclusive-create lock mechanism the session store uses, keyed by the
//! file's own path.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::seq::SliceRandom;

use oc_domain::config::PairingConfig;
use oc_domain::error::{Error, Result};
use oc_domain::model::{AllowListEntry, AllowListFile, PairingMeta, PairingRequest, PAIRING_CODE_ALPHABET, PAIRING_CODE_LEN};
use oc_domain::trace::TraceEvent;
use oc_sessions::lock::{self, LockOptions};

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct RequestsFile {
    version: u32,
    #[serde(default)]
    requests: Vec<PairingRequest>,
}

impl RequestsFile {
    fn new() -> Self {
        Self {
            version: 1,
            requests: Vec::new(),
        }
    }
}

/// Outcome of [`PairingStore::upsert_pairing_request`].
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub code: String,
    pub created: bool,
}

/// Outcome of [`PairingStore::approve_code`]: the normalized peer id that
/// was moved into the allowlist, if the code matched a pending request.
pub type ApproveOutcome = Option<String>;

pub struct PairingStore {
    base_dir: PathBuf,
    cfg: PairingConfig,
}

impl PairingStore {
    pub fn new(base_dir: impl Into<PathBuf>, cfg: PairingConfig) -> Self {
        Self {
            base_dir: base_dir.into(),
            cfg,
        }
    }

    fn requests_path(&self, channel: &str) -> PathBuf {
        self.base_dir.join(format!("{channel}-pairing.json"))
    }

    fn allow_path(&self, channel: &str, account_id: Option<&str>) -> PathBuf {
        match account_id {
            Some(acct) => self.base_dir.join(format!("{channel}-{acct}-allowFrom.json")),
            None => self.base_dir.join(format!("{channel}-allowFrom.json")),
        }
    }

    fn lock_opts(&self) -> LockOptions {
        LockOptions {
            stale_ms: 30 * 60 * 1000,
            timeout_ms: 10_000,
        }
    }

    /// Create or refresh a pending pairing request. Reuses the existing
    /// code (and refreshes `lastSeenAt`) if `id` already has a pending
    /// request; otherwise generates a fresh code via rejection sampling
    /// against the channel's current pending set and enforces the
    /// per-channel LRU cap (evicting the entry with the oldest
    /// `lastSeenAt` when the cap would be exceeded).
    pub async fn upsert_pairing_request(&self, channel: &str, id: &str, meta: PairingMeta) -> Result<UpsertOutcome> {
        let path = self.requests_path(channel);
        let channel = channel.to_string();
        let id = id.to_string();
        let cfg = self.cfg.clone();

        let _guard = lock::acquire(&path, &self.lock_opts()).await?;
        let mut file = read_requests(&path)?;
        let now = Utc::now();
        prune_expired(&mut file, now, cfg.ttl_ms);

        if let Some(existing) = file.requests.iter_mut().find(|r| r.id == id) {
            existing.last_seen_at = now;
            let code = existing.code.clone();
            write_requests(&path, &file)?;
            return Ok(UpsertOutcome { code, created: false });
        }

        let code = generate_unique_code(&file.requests, cfg.max_code_generation_attempts)?;

        if file.requests.len() >= cfg.pending_cap_per_channel {
            if let Some((idx, evicted)) = file
                .requests
                .iter()
                .enumerate()
                .min_by_key(|(_, r)| r.last_seen_at)
                .map(|(idx, r)| (idx, r.id.clone()))
            {
                file.requests.remove(idx);
                TraceEvent::PairingEvicted {
                    channel: channel.clone(),
                    id: evicted,
                }
                .emit();
            }
        }

        file.requests.push(PairingRequest {
            id: id.clone(),
            code: code.clone(),
            created_at: now,
            last_seen_at: now,
            meta,
        });
        write_requests(&path, &file)?;

        TraceEvent::PairingCreated {
            channel,
            code: code.clone(),
        }
        .emit();

        Ok(UpsertOutcome { code, created: true })
    }

    /// Find the pending request matching `code`, remove it, and add its
    /// normalized id to the allowlist (account-scoped when `account_id` is
    /// `Some`). Atomic: reads, mutates, and persists both files under the
    /// requests-file lock. Returns `None` when no pending request matches.
    pub async fn approve_code(&self, channel: &str, code: &str, account_id: Option<&str>) -> Result<ApproveOutcome> {
        let req_path = self.requests_path(channel);
        let _guard = lock::acquire(&req_path, &self.lock_opts()).await?;

        let mut file = read_requests(&req_path)?;
        let now = Utc::now();
        prune_expired(&mut file, now, self.cfg.ttl_ms);

        let idx = match file.requests.iter().position(|r| r.code == code) {
            Some(idx) => idx,
            None => return Ok(None),
        };
        let request = file.requests.remove(idx);
        write_requests(&req_path, &file)?;

        self.add_allow_from_entry(channel, account_id, &request.id).await?;

        TraceEvent::PairingApproved {
            channel: channel.to_string(),
            id: request.id.clone(),
        }
        .emit();

        Ok(Some(request.id))
    }

    /// List pending requests for `channel`, pruning expired ones first.
    /// `account_id` is accepted for interface symmetry with the allowlist
    /// reads but requests are not themselves account-scoped.
    pub async fn list_requests(&self, channel: &str, _account_id: Option<&str>) -> Result<Vec<PairingRequest>> {
        let path = self.requests_path(channel);
        let _guard = lock::acquire(&path, &self.lock_opts()).await?;
        let mut file = read_requests(&path)?;
        let now = Utc::now();
        let had_expired = file.requests.iter().any(|r| r.is_expired(now, chrono::Duration::milliseconds(self.cfg.ttl_ms)));
        prune_expired(&mut file, now, self.cfg.ttl_ms);
        if had_expired {
            write_requests(&path, &file)?;
        }
        Ok(file.requests)
    }

    /// Add a normalized entry to the channel's (optionally account-scoped)
    /// allowlist file. `*` is never stored.
    pub async fn add_allow_from_entry(&self, channel: &str, account_id: Option<&str>, entry: &str) -> Result<()> {
        if AllowListEntry::is_wildcard(entry) {
            return Ok(());
        }
        let path = self.allow_path(channel, account_id);
        let _guard = lock::acquire(&path, &self.lock_opts()).await?;
        let mut file = read_allowlist(&path)?;
        if !file.allow_from.iter().any(|e| e.as_str() == entry) {
            file.allow_from.push(AllowListEntry::new(entry));
        }
        write_allowlist(&path, &file)
    }

    pub async fn remove_allow_from_entry(&self, channel: &str, account_id: Option<&str>, entry: &str) -> Result<()> {
        let path = self.allow_path(channel, account_id);
        let _guard = lock::acquire(&path, &self.lock_opts()).await?;
        let mut file = read_allowlist(&path)?;
        file.allow_from.retain(|e| e.as_str() != entry);
        write_allowlist(&path, &file)
    }

    /// Merge scoped (account-specific) and legacy (unscoped) allowlist
    /// entries for `channel`, scoped entries first, de-duplicated.
    ///
    /// Open question (spec.md §9): whether a revoked scoped entry should
    /// mask a legacy entry for the same id is left undecided upstream; this
    /// implementation takes the union (scoped-first order), matching the
    /// "source reads both and dedupes preserving scoped-first order"
    /// behavior described in the spec without adding masking semantics.
    pub async fn read_allow_from_store(&self, channel: &str, account_id: Option<&str>) -> Result<Vec<AllowListEntry>> {
        let mut seen = std::collections::HashSet::new();
        let mut merged = Vec::new();

        if let Some(acct) = account_id {
            let scoped_path = self.allow_path(channel, Some(acct));
            for entry in read_allowlist(&scoped_path)?.allow_from {
                if seen.insert(entry.as_str().to_string()) {
                    merged.push(entry);
                }
            }
        }

        let legacy_path = self.allow_path(channel, None);
        for entry in read_allowlist(&legacy_path)?.allow_from {
            if seen.insert(entry.as_str().to_string()) {
                merged.push(entry);
            }
        }

        Ok(merged)
    }
}

fn prune_expired(file: &mut RequestsFile, now: chrono::DateTime<Utc>, ttl_ms: i64) {
    let ttl = chrono::Duration::milliseconds(ttl_ms);
    file.requests.retain(|r| !r.is_expired(now, ttl));
}

/// Generate an 8-character code from [`PAIRING_CODE_ALPHABET`], unique
/// against `existing`, via rejection sampling capped at `max_attempts`.
fn generate_unique_code(existing: &[PairingRequest], max_attempts: u32) -> Result<String> {
    let alphabet: Vec<char> = PAIRING_CODE_ALPHABET.chars().collect();
    let mut rng = rand::thread_rng();

    for _ in 0..max_attempts {
        let code: String = (0..PAIRING_CODE_LEN)
            .map(|_| *alphabet.choose(&mut rng).expect("alphabet is non-empty"))
            .collect();
        if !existing.iter().any(|r| r.code == code) {
            return Ok(code);
        }
    }

    Err(Error::Other(format!(
        "failed to generate a unique pairing code after {max_attempts} attempts"
    )))
}

fn read_requests(path: &Path) -> Result<RequestsFile> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(serde_json::from_str(&raw).unwrap_or_else(|_| RequestsFile::new())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RequestsFile::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_requests(path: &Path, file: &RequestsFile) -> Result<()> {
    write_json_atomic(path, file)
}

fn read_allowlist(path: &Path) -> Result<AllowListFile> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(serde_json::from_str(&raw).unwrap_or_else(|_| AllowListFile::new())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AllowListFile::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_allowlist(path: &Path, file: &AllowListFile) -> Result<()> {
    write_json_atomic(path, file)
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> PairingStore {
        PairingStore::new(dir, PairingConfig::default())
    }

    #[tokio::test]
    async fn upsert_then_upsert_again_reuses_code() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let first = store
            .upsert_pairing_request("telegram", "+15550001111", PairingMeta::default())
            .await
            .unwrap();
        assert!(first.created);
        assert_eq!(first.code.len(), PAIRING_CODE_LEN);

        let second = store
            .upsert_pairing_request("telegram", "+15550001111", PairingMeta::default())
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.code, first.code);
    }

    #[tokio::test]
    async fn approve_code_moves_id_into_allowlist_and_removes_request() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let outcome = store
            .upsert_pairing_request("telegram", "+15550001111", PairingMeta::default())
            .await
            .unwrap();

        let approved = store.approve_code("telegram", &outcome.code, None).await.unwrap();
        assert_eq!(approved.as_deref(), Some("+15550001111"));

        let allow = store.read_allow_from_store("telegram", None).await.unwrap();
        assert!(allow.iter().any(|e| e.as_str() == "+15550001111"));

        // A second approval of the same code now yields None.
        let second = store.approve_code("telegram", &outcome.code, None).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn pending_cap_evicts_lru() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = PairingConfig::default();
        cfg.pending_cap_per_channel = 3;
        let store = PairingStore::new(dir.path(), cfg);

        for i in 0..3 {
            store
                .upsert_pairing_request("telegram", &format!("peer{i}"), PairingMeta::default())
                .await
                .unwrap();
        }
        // Touch peer0 to make it the most recently seen, leaving peer1
        // as the oldest and therefore the next eviction victim.
        store
            .upsert_pairing_request("telegram", "peer0", PairingMeta::default())
            .await
            .unwrap();

        store
            .upsert_pairing_request("telegram", "peer3", PairingMeta::default())
            .await
            .unwrap();

        let remaining = store.list_requests("telegram", None).await.unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(!remaining.iter().any(|r| r.id == "peer1"));
        assert!(remaining.iter().any(|r| r.id == "peer0"));
        assert!(remaining.iter().any(|r| r.id == "peer3"));
    }

    #[tokio::test]
    async fn scoped_allow_entries_come_before_legacy() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store.add_allow_from_entry("telegram", None, "legacy-peer").await.unwrap();
        store.add_allow_from_entry("telegram", Some("acct1"), "scoped-peer").await.unwrap();

        let merged = store.read_allow_from_store("telegram", Some("acct1")).await.unwrap();
        assert_eq!(merged[0].as_str(), "scoped-peer");
        assert_eq!(merged[1].as_str(), "legacy-peer");
    }

    #[tokio::test]
    async fn wildcard_is_never_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.add_allow_from_entry("telegram", None, "*").await.unwrap();
        let merged = store.read_allow_from_store("telegram", None).await.unwrap();
        assert!(merged.is_empty());
    }
}
