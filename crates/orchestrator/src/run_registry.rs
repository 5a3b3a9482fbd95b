//! Active-run bookkeeping: one [`PendingPrompt`] plus cancellation token
//! per session key (spec.md §4.9, §5).
//!
//! Grounded in the teacher's `CancelToken`/`CancelMap`, generalized from
//! an explicit group side-table to whatever the caller tells it about —
//! the sub-agent tree itself lives in [`crate::subagent_registry`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use oc_domain::model::{PendingPrompt, SessionKey, TerminalState};

#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

struct RunEntry {
    prompt: PendingPrompt,
    cancel: CancelToken,
}

/// Tracks the single active run per session key. A second prompt for a
/// key that already has one cancels the first before registering the
/// new one (spec.md model/run.rs doc comment).
#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<SessionKey, RunEntry>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run for `session_key`, cancelling and discarding
    /// any run already active under that key.
    pub fn start(&self, session_key: SessionKey, idempotency_key: impl Into<String>, now: DateTime<Utc>) -> (PendingPrompt, CancelToken) {
        let mut runs = self.runs.lock();
        if let Some(existing) = runs.remove(&session_key) {
            existing.cancel.cancel();
        }
        let prompt = PendingPrompt::new(session_key.clone(), idempotency_key, now);
        let cancel = CancelToken::new();
        runs.insert(
            session_key,
            RunEntry {
                prompt: prompt.clone(),
                cancel: cancel.clone(),
            },
        );
        (prompt, cancel)
    }

    pub fn is_active(&self, session_key: &SessionKey) -> bool {
        self.runs.lock().contains_key(session_key)
    }

    pub fn cancel_token(&self, session_key: &SessionKey) -> Option<CancelToken> {
        self.runs.lock().get(session_key).map(|e| e.cancel.clone())
    }

    /// Record a new tool-call id against the active run.
    pub fn record_tool_call(&self, session_key: &SessionKey, tool_call_id: &str) {
        if let Some(entry) = self.runs.lock().get_mut(session_key) {
            entry.prompt.tool_calls.insert(tool_call_id.to_string());
        }
    }

    /// Current streamed-text length for the active run (0 if untracked).
    pub fn sent_text_length(&self, session_key: &SessionKey) -> usize {
        self.runs.lock().get(session_key).map(|e| e.prompt.sent_text_length).unwrap_or(0)
    }

    pub fn set_sent_text_length(&self, session_key: &SessionKey, len: usize) {
        if let Some(entry) = self.runs.lock().get_mut(session_key) {
            entry.prompt.sent_text_length = len;
        }
    }

    /// Resolve (remove) the active run for `session_key`. Returns the
    /// resolved prompt and outcome, or `None` if nothing was active —
    /// every terminal event resolves exactly once.
    pub fn resolve(&self, session_key: &SessionKey, outcome: TerminalState) -> Option<(PendingPrompt, TerminalState)> {
        self.runs.lock().remove(session_key).map(|e| (e.prompt, outcome))
    }

    /// Cancel-and-resolve, used by cascade stop: signals the token and
    /// removes the entry in one step. No-op if already resolved.
    pub fn cancel_and_resolve(&self, session_key: &SessionKey) -> bool {
        let mut runs = self.runs.lock();
        if let Some(entry) = runs.remove(session_key) {
            entry.cancel.cancel();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> SessionKey {
        SessionKey::canonicalize(s)
    }

    #[test]
    fn second_prompt_cancels_first() {
        let reg = RunRegistry::new();
        let now = Utc::now();
        let (_p1, cancel1) = reg.start(key("agent:a:direct:main"), "idem-1", now);
        assert!(!cancel1.is_cancelled());

        let (_p2, _cancel2) = reg.start(key("agent:a:direct:main"), "idem-2", now);
        assert!(cancel1.is_cancelled());
    }

    #[test]
    fn resolve_removes_entry_exactly_once() {
        let reg = RunRegistry::new();
        let now = Utc::now();
        let k = key("agent:a:direct:main");
        reg.start(k.clone(), "idem-1", now);

        assert!(reg.is_active(&k));
        let resolved = reg.resolve(&k, TerminalState::EndTurn);
        assert!(resolved.is_some());
        assert!(!reg.is_active(&k));
        assert!(reg.resolve(&k, TerminalState::EndTurn).is_none());
    }

    #[test]
    fn cancel_and_resolve_signals_token() {
        let reg = RunRegistry::new();
        let now = Utc::now();
        let k = key("agent:a:direct:main");
        let (_p, cancel) = reg.start(k.clone(), "idem-1", now);

        assert!(reg.cancel_and_resolve(&k));
        assert!(cancel.is_cancelled());
        assert!(!reg.cancel_and_resolve(&k));
    }

    #[test]
    fn sent_text_length_tracks_deltas() {
        let reg = RunRegistry::new();
        let now = Utc::now();
        let k = key("agent:a:direct:main");
        reg.start(k.clone(), "idem-1", now);

        assert_eq!(reg.sent_text_length(&k), 0);
        reg.set_sent_text_length(&k, 42);
        assert_eq!(reg.sent_text_length(&k), 42);
    }
}
