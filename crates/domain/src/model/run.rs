//! In-flight agent turns (`PendingPrompt`/`Run`) and sub-agent tree
//! bookkeeping.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session_key::SessionKey;

/// Terminal state of a completed run. Exactly one of these is ever reached
/// per [`PendingPrompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    EndTurn,
    Cancelled,
    Refusal,
}

/// One active agent turn. Registered under exactly one [`SessionKey`] in
/// the orchestrator's pending map; a second prompt for the same key
/// cancels the first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPrompt {
    pub run_id: uuid::Uuid,
    pub session_key: SessionKey,
    pub idempotency_key: String,
    /// Count of characters already streamed to the client; used to compute
    /// the new suffix on the next delta event.
    pub sent_text_length: usize,
    pub tool_calls: HashSet<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingPrompt {
    pub fn new(session_key: SessionKey, idempotency_key: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4(),
            session_key,
            idempotency_key: idempotency_key.into(),
            sent_text_length: 0,
            tool_calls: HashSet::new(),
            created_at,
        }
    }
}

/// Alias matching the spec's "PendingPrompt / Run" naming.
pub type Run = PendingPrompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAgentCleanup {
    Keep,
    Delete,
}

/// One sub-agent invocation. Tree edges are derived purely from the prefix
/// relationship between `child_session_key` and `requester_session_key` —
/// no separate pointer graph is maintained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentRun {
    pub run_id: uuid::Uuid,
    pub child_session_key: SessionKey,
    pub requester_session_key: SessionKey,
    pub task: String,
    pub cleanup: SubAgentCleanup,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<TerminalState>,
}

impl SubAgentRun {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}
