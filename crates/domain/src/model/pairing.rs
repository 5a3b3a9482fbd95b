//! Pairing store types — [`PairingRequest`] and allowlist entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alphabet for generated pairing codes — excludes `0`, `O`, `1`, `I` to
/// avoid visual ambiguity when a human types the code back in.
pub const PAIRING_CODE_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length, in characters, of a generated pairing code.
pub const PAIRING_CODE_LEN: usize = 8;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairingMeta {
    pub account_id: Option<String>,
    pub name: Option<String>,
}

/// A pending pairing request for one normalized peer identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingRequest {
    /// Normalized peer identifier (see [`crate::model::allowlist::AllowListEntry`]).
    pub id: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub meta: PairingMeta,
}

impl PairingRequest {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.created_at >= ttl
    }
}
