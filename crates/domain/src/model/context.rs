//! The normalized inbound envelope (`Ctx` / `MsgContext`) threaded through
//! the dispatch pipeline. Built once by the orchestrator and immutable
//! after finalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session_key::{ChatType, SessionKey};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgContext {
    pub body: String,
    pub raw_body: String,
    pub command_body: Option<String>,
    pub from: String,
    pub to: String,
    pub session_key: SessionKey,
    pub account_id: Option<String>,
    pub chat_type: ChatType,
    pub provider: String,
    pub surface: Option<String>,
    pub originating_channel: Option<String>,
    pub originating_to: Option<String>,
    pub message_sid: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub was_mentioned: bool,
    pub command_authorized: bool,
    pub timestamp: DateTime<Utc>,
}

/// Alias matching the spec's "Ctx (MsgContext)" naming.
pub type Ctx = MsgContext;

impl MsgContext {
    /// The channel a reply should actually be sent on: the originating
    /// channel when it differs from the provider that produced this
    /// context, otherwise the provider itself.
    pub fn reply_channel(&self) -> &str {
        match &self.originating_channel {
            Some(ch) if ch != &self.provider => ch,
            _ => &self.provider,
        }
    }

    pub fn reply_to(&self) -> &str {
        self.originating_to.as_deref().unwrap_or(&self.to)
    }

    pub fn needs_cross_channel_routing(&self) -> bool {
        matches!(&self.originating_channel, Some(ch) if ch != &self.provider)
    }
}
