//! Session store entry types — one [`SessionEntry`] per [`SessionKey`].

use serde::{Deserialize, Serialize};

use super::session_key::ChatType;

/// A caller-supplied send policy override recorded against a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendPolicy {
    Allow,
    Suppress,
}

/// Persisted record for one session key. Owned exclusively by the session
/// store — no other component mutates it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub session_id: uuid::Uuid,
    /// Milliseconds since the Unix epoch. Monotonically non-decreasing per
    /// key across durable writes.
    pub updated_at: i64,
    pub session_file: Option<String>,
    pub last_channel: Option<String>,
    pub last_to: Option<String>,
    pub last_provider: Option<String>,
    pub model: Option<String>,
    pub chat_type: Option<ChatType>,
    pub send_policy: Option<SendPolicy>,
}

impl SessionEntry {
    /// Build a fresh entry for a brand-new session key.
    pub fn new(session_id: uuid::Uuid, updated_at: i64) -> Self {
        Self {
            session_id,
            updated_at,
            session_file: None,
            last_channel: None,
            last_to: None,
            last_provider: None,
            model: None,
            chat_type: None,
            send_policy: None,
        }
    }
}
