//! On-disk auth-profile store.
//!
//! Wire format (spec.md §6): `{ version, profiles: {id -> {type, provider,
//! credentials}}, order: {provider -> [id]}, usageStats: {id -> UsageStats} }`.
//! Credentials and usage bookkeeping are split on disk but merged into a
//! single [`AuthProfile`] in memory — callers never see the split.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use oc_domain::error::Result;
use oc_domain::model::{AuthProfile, AuthProfileType, UsageStats};
use oc_sessions::lock::{self, LockOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileFileEntry {
    provider: String,
    #[serde(rename = "type")]
    kind: AuthProfileType,
    credentials: serde_json::Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    profiles: HashMap<String, ProfileFileEntry>,
    #[serde(default)]
    order: HashMap<String, Vec<String>>,
    #[serde(default, rename = "usageStats")]
    usage_stats: HashMap<String, UsageStats>,
}

impl StoreFile {
    fn new() -> Self {
        Self {
            version: 1,
            ..Default::default()
        }
    }
}

pub struct AuthProfileStore {
    path: PathBuf,
}

impl AuthProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn lock_opts(&self) -> LockOptions {
        LockOptions {
            stale_ms: 30 * 60 * 1000,
            timeout_ms: 10_000,
        }
    }

    /// Load every profile for `provider`, in the on-disk `order` sequence
    /// (profiles present but absent from `order` are appended afterward).
    pub async fn load_provider(&self, provider: &str) -> Result<Vec<AuthProfile>> {
        let file = read_file(&self.path)?;
        Ok(merge_provider(&file, provider))
    }

    pub async fn load_all(&self) -> Result<Vec<AuthProfile>> {
        let file = read_file(&self.path)?;
        let mut all: Vec<AuthProfile> = file
            .profiles
            .iter()
            .map(|(id, entry)| merge_one(id, entry, &file.usage_stats))
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    /// Mutate the persisted `usageStats` for `profile_id` under the store
    /// lock, reloading from disk first (optimistic reconciliation).
    pub async fn update_usage<F>(&self, profile_id: &str, mutator: F) -> Result<UsageStats>
    where
        F: FnOnce(&mut UsageStats),
    {
        let _guard = lock::acquire(&self.path, &self.lock_opts()).await?;
        let mut file = read_file(&self.path)?;
        let stats = file.usage_stats.entry(profile_id.to_string()).or_default();
        mutator(stats);
        let result = stats.clone();
        write_file(&self.path, &file)?;
        Ok(result)
    }

    /// Register a new credential profile (idempotent on `id`).
    pub async fn upsert_profile(&self, profile: &AuthProfile) -> Result<()> {
        let _guard = lock::acquire(&self.path, &self.lock_opts()).await?;
        let mut file = read_file(&self.path)?;
        file.profiles.insert(
            profile.id.clone(),
            ProfileFileEntry {
                provider: profile.provider.clone(),
                kind: profile.kind,
                credentials: profile.credentials.clone(),
            },
        );
        let order = file.order.entry(profile.provider.clone()).or_default();
        if !order.contains(&profile.id) {
            order.push(profile.id.clone());
        }
        file.usage_stats.entry(profile.id.clone()).or_insert_with(|| profile.usage_stats.clone());
        write_file(&self.path, &file)
    }
}

fn merge_provider(file: &StoreFile, provider: &str) -> Vec<AuthProfile> {
    let ordered_ids = file.order.get(provider).cloned().unwrap_or_default();
    let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
    let mut result = Vec::new();

    for id in &ordered_ids {
        if let Some(entry) = file.profiles.get(id) {
            if entry.provider == provider {
                seen.insert(id.as_str());
                result.push(merge_one(id, entry, &file.usage_stats));
            }
        }
    }
    let mut stragglers: Vec<(&String, &ProfileFileEntry)> = file
        .profiles
        .iter()
        .filter(|(id, entry)| entry.provider == provider && !seen.contains(id.as_str()))
        .collect();
    stragglers.sort_by(|a, b| a.0.cmp(b.0));
    for (id, entry) in stragglers {
        result.push(merge_one(id, entry, &file.usage_stats));
    }
    result
}

fn merge_one(id: &str, entry: &ProfileFileEntry, usage_stats: &HashMap<String, UsageStats>) -> AuthProfile {
    AuthProfile {
        id: id.to_string(),
        provider: entry.provider.clone(),
        kind: entry.kind,
        credentials: entry.credentials.clone(),
        usage_stats: usage_stats.get(id).cloned().unwrap_or_default(),
    }
}

fn read_file(path: &Path) -> Result<StoreFile> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(serde_json::from_str(&raw).unwrap_or_else(|_| StoreFile::new())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreFile::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_file(path: &Path, file: &StoreFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(file)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
