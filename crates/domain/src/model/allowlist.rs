//! Normalized allowlist entries.
//!
//! An [`AllowListEntry`] is a channel-dependent normalized identifier:
//! E.164 for phone-bearing channels, a JID suffix for WhatsApp, a
//! lower-cased handle for everything else. Entries are scoped per channel
//! and optionally per account; legacy unscoped files remain readable for
//! backward compatibility.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowListEntry(String);

impl AllowListEntry {
    /// Wrap an already-normalized identifier. Normalization itself is a
    /// channel-adapter responsibility (`normalizeAllowEntry`), external to
    /// this crate.
    pub fn new(normalized: impl Into<String>) -> Self {
        Self(normalized.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The wildcard entry is never stored in an allowlist file; it is only
    /// meaningful as a configured `allowFrom` value meaning "any sender".
    pub fn is_wildcard(raw: &str) -> bool {
        raw == "*"
    }
}

impl std::fmt::Display for AllowListEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk allowlist file contents for one channel (optionally one
/// `<channel>-<account>` scope).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowListFile {
    pub version: u32,
    #[serde(rename = "allowFrom")]
    pub allow_from: Vec<AllowListEntry>,
}

impl AllowListFile {
    pub fn new() -> Self {
        Self {
            version: 1,
            allow_from: Vec::new(),
        }
    }
}
