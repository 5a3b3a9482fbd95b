//! Session key computation and canonicalization.
//!
//! Canonical form: `agent:<agentId>:<scope>:<origin>` — an ordered, `:`
//! delimited, lower-cased string of at most 256 bytes. `scope` encodes the
//! chat type (`direct`|`group`|`channel`|`cron`|`subagent`); `origin` encodes
//! the external addressability of the peer. Never trusted from external
//! input directly — always derived from inbound metadata by
//! [`compute_session_key`].

use serde::{Deserialize, Serialize};

/// Maximum length, in bytes, of a canonical session key.
pub const MAX_SESSION_KEY_BYTES: usize = 256;

/// A canonical, validated session key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Wrap an already-canonical string without re-validating. Used by
    /// deserialization of trusted store contents.
    pub fn from_trusted(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Canonicalize an arbitrary key: lower-case and truncate to
    /// [`MAX_SESSION_KEY_BYTES`] bytes on a `:` boundary where possible.
    pub fn canonicalize(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.len() <= MAX_SESSION_KEY_BYTES {
            return Self(lower);
        }
        let mut truncated = lower.as_bytes()[..MAX_SESSION_KEY_BYTES].to_vec();
        while !truncated.is_empty() && truncated[truncated.len() - 1] != b':' {
            truncated.pop();
        }
        if truncated.is_empty() {
            truncated = lower.as_bytes()[..MAX_SESSION_KEY_BYTES].to_vec();
        }
        Self(String::from_utf8_lossy(&truncated).trim_end_matches(':').to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `agent:<agentId>` prefix of this key.
    pub fn agent_id(&self) -> Option<&str> {
        self.0.strip_prefix("agent:")?.split(':').next()
    }

    /// True if `self` denotes a sub-agent session spawned (directly or
    /// transitively) by `parent`. Tree edges are derived purely from the
    /// prefix relationship between child and parent session keys — no
    /// pointer graph is held.
    pub fn is_descendant_of(&self, parent: &SessionKey) -> bool {
        let prefix = format!("{}:subagent:", parent.0);
        self.0.starts_with(&prefix)
    }

    /// Build the child session key for a sub-agent spawned from `self`.
    pub fn child_key(&self, child_id: &str) -> SessionKey {
        SessionKey::canonicalize(&format!("{}:subagent:{}", self.0, child_id))
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Chat-type scope encoded into the session key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Direct,
    Group,
    Channel,
    Cron,
    Subagent,
}

impl std::fmt::Display for ChatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChatType::Direct => "direct",
            ChatType::Group => "group",
            ChatType::Channel => "channel",
            ChatType::Cron => "cron",
            ChatType::Subagent => "subagent",
        };
        f.write_str(s)
    }
}

/// How DM sessions are scoped — controls how much of the inbound metadata
/// is folded into the origin component of the key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmScope {
    /// `agent:<agentId>:direct:main` — one shared DM session.
    Main,
    /// `agent:<agentId>:direct:<peerId>` — isolated per peer.
    PerPeer,
    /// `agent:<agentId>:direct:<channel>:<peerId>` — isolated per channel+peer.
    #[default]
    PerChannelPeer,
    /// `agent:<agentId>:direct:<channel>:<accountId>:<peerId>` — full isolation.
    PerAccountChannelPeer,
}

/// Metadata carried with every normalized inbound message, used to compute
/// the session key.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InboundMetadata {
    pub channel: Option<String>,
    pub account_id: Option<String>,
    pub peer_id: Option<String>,
    pub group_id: Option<String>,
    pub channel_id: Option<String>,
    pub thread_id: Option<String>,
    pub is_direct: bool,
    pub is_cron: bool,
}

/// Compute a canonical session key from the agent ID, DM scope, and inbound
/// metadata.
pub fn compute_session_key(agent_id: &str, dm_scope: DmScope, meta: &InboundMetadata) -> SessionKey {
    let base = format!("agent:{agent_id}");

    if meta.is_cron {
        return SessionKey::canonicalize(&format!("{base}:cron:scheduled"));
    }

    if !meta.is_direct {
        let key = compute_group_origin(&base, meta);
        return SessionKey::canonicalize(&maybe_append_thread(key, meta));
    }

    let peer = meta.peer_id.as_deref().unwrap_or("unknown");
    let key = match dm_scope {
        DmScope::Main => format!("{base}:direct:main"),
        DmScope::PerPeer => format!("{base}:direct:{peer}"),
        DmScope::PerChannelPeer => {
            let ch = meta.channel.as_deref().unwrap_or("default");
            format!("{base}:direct:{ch}:{peer}")
        }
        DmScope::PerAccountChannelPeer => {
            let ch = meta.channel.as_deref().unwrap_or("default");
            let acct = meta.account_id.as_deref().unwrap_or("default");
            format!("{base}:direct:{ch}:{acct}:{peer}")
        }
    };

    SessionKey::canonicalize(&maybe_append_thread(key, meta))
}

fn compute_group_origin(base: &str, meta: &InboundMetadata) -> String {
    let ch = meta.channel.as_deref().unwrap_or("default");
    let scope = if meta.channel_id.is_some() && meta.group_id.is_none() {
        "channel"
    } else {
        "group"
    };

    match (&meta.group_id, &meta.channel_id) {
        (Some(group_id), Some(channel_id)) => {
            format!("{base}:{scope}:{ch}:{group_id}:{channel_id}")
        }
        (Some(group_id), None) => format!("{base}:{scope}:{ch}:{group_id}"),
        (None, Some(channel_id)) => format!("{base}:{scope}:{ch}:{channel_id}"),
        (None, None) => format!("{base}:{scope}:{ch}:unknown"),
    }
}

fn maybe_append_thread(key: String, meta: &InboundMetadata) -> String {
    match &meta.thread_id {
        Some(tid) => format!("{key}:{tid}"),
        None => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(channel: &str, peer: &str, is_direct: bool) -> InboundMetadata {
        InboundMetadata {
            channel: Some(channel.into()),
            peer_id: Some(peer.into()),
            is_direct,
            ..Default::default()
        }
    }

    #[test]
    fn dm_main_scope() {
        let key = compute_session_key("bot1", DmScope::Main, &meta("telegram", "alice", true));
        assert_eq!(key.as_str(), "agent:bot1:direct:main");
    }

    #[test]
    fn dm_per_peer() {
        let key = compute_session_key("bot1", DmScope::PerPeer, &meta("telegram", "alice", true));
        assert_eq!(key.as_str(), "agent:bot1:direct:alice");
    }

    #[test]
    fn dm_per_channel_peer() {
        let key =
            compute_session_key("bot1", DmScope::PerChannelPeer, &meta("telegram", "alice", true));
        assert_eq!(key.as_str(), "agent:bot1:direct:telegram:alice");
    }

    #[test]
    fn group_message() {
        let m = InboundMetadata {
            channel: Some("discord".into()),
            group_id: Some("server42".into()),
            channel_id: Some("general".into()),
            is_direct: false,
            ..Default::default()
        };
        let key = compute_session_key("bot1", DmScope::PerChannelPeer, &m);
        assert_eq!(key.as_str(), "agent:bot1:group:discord:server42:general");
    }

    #[test]
    fn cron_scope() {
        let m = InboundMetadata {
            is_cron: true,
            ..Default::default()
        };
        let key = compute_session_key("bot1", DmScope::PerChannelPeer, &m);
        assert_eq!(key.as_str(), "agent:bot1:cron:scheduled");
    }

    #[test]
    fn lowercased_and_canonical() {
        let m = meta("Telegram", "Alice", true);
        let key = compute_session_key("Bot1", DmScope::PerChannelPeer, &m);
        assert_eq!(key.as_str(), "agent:bot1:direct:telegram:alice");
    }

    #[test]
    fn truncated_to_256_bytes() {
        let long_peer = "p".repeat(400);
        let m = meta("telegram", &long_peer, true);
        let key = compute_session_key("bot1", DmScope::PerChannelPeer, &m);
        assert!(key.as_str().len() <= MAX_SESSION_KEY_BYTES);
    }

    #[test]
    fn child_key_is_descendant() {
        let parent = SessionKey::canonicalize("agent:bot1:direct:alice");
        let child = parent.child_key("task1");
        assert_eq!(child.as_str(), "agent:bot1:direct:alice:subagent:task1");
        assert!(child.is_descendant_of(&parent));

        let grandchild = child.child_key("task2");
        assert!(grandchild.is_descendant_of(&parent));
        assert!(grandchild.is_descendant_of(&child));
    }

    #[test]
    fn unrelated_key_is_not_descendant() {
        let parent = SessionKey::canonicalize("agent:bot1:direct:alice");
        let other = SessionKey::canonicalize("agent:bot1:direct:bob");
        assert!(!other.is_descendant_of(&parent));
    }
}
