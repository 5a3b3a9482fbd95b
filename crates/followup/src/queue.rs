//! Per-session follow-up queue (spec.md §4.5).
//!
//! One [`SessionState`] per session key, guarded by a single map-wide
//! [`parking_lot::Mutex`] so enqueue, drain, and clear observe each
//! other atomically — mirroring the teacher's `SessionLockMap`, but
//! here the "lock" protects a small buffer rather than gating a turn.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use oc_domain::config::followup::{DropPolicy, FollowupConfig, FollowupMode};
use oc_domain::model::MsgContext;

#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    /// Added to the pending batch (collect mode).
    Queued { depth: usize },
    /// Collapsed the oldest item into the running summary marker and
    /// added the new one (collect mode, `summarize` drop policy).
    Summarized { depth: usize, summarized_count: usize },
    /// Replaced the single pending item (latest mode).
    Replaced,
    /// Interrupt mode: the caller must abort the in-flight turn and
    /// start a new one with this context. Nothing is queued.
    Interrupt(MsgContext),
    /// Queue was at cap under the `reject` drop policy; the message was
    /// dropped entirely.
    Rejected,
}

/// The merged result of draining a session's pending follow-ups.
#[derive(Debug, Clone)]
pub struct DrainResult {
    /// Prompt body to run next, with any summary marker and per-item
    /// bodies already merged in arrival order.
    pub merged_body: String,
    /// The raw contexts that made up this batch, oldest first.
    pub contexts: Vec<MsgContext>,
    pub summarized_count: usize,
}

#[derive(Default)]
struct SessionState {
    items: VecDeque<MsgContext>,
    summarized_count: usize,
    last_enqueued_at: Option<DateTime<Utc>>,
}

pub struct FollowupQueue {
    cfg: FollowupConfig,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl FollowupQueue {
    pub fn new(cfg: FollowupConfig) -> Self {
        Self {
            cfg,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Exact current queue depth for a session (0 if untracked).
    pub fn depth(&self, session_key: &str) -> usize {
        self.sessions.lock().get(session_key).map(|s| s.items.len()).unwrap_or(0)
    }

    /// Milliseconds remaining in the debounce window, or `None` if there
    /// is nothing pending or the window has already elapsed.
    pub fn debounce_remaining_ms(&self, session_key: &str, now: DateTime<Utc>) -> Option<i64> {
        let sessions = self.sessions.lock();
        let state = sessions.get(session_key)?;
        let last = state.last_enqueued_at?;
        let elapsed = (now - last).num_milliseconds();
        let remaining = self.cfg.debounce_ms - elapsed;
        if remaining > 0 {
            Some(remaining)
        } else {
            None
        }
    }

    pub fn enqueue(&self, session_key: &str, ctx: MsgContext, now: DateTime<Utc>) -> EnqueueOutcome {
        match self.cfg.mode {
            FollowupMode::Interrupt => EnqueueOutcome::Interrupt(ctx),
            FollowupMode::Latest => {
                let mut sessions = self.sessions.lock();
                let state = sessions.entry(session_key.to_string()).or_default();
                state.items.clear();
                state.items.push_back(ctx);
                state.last_enqueued_at = Some(now);
                EnqueueOutcome::Replaced
            }
            FollowupMode::Collect => self.enqueue_collect(session_key, ctx, now),
        }
    }

    fn enqueue_collect(&self, session_key: &str, ctx: MsgContext, now: DateTime<Utc>) -> EnqueueOutcome {
        let mut sessions = self.sessions.lock();
        let state = sessions.entry(session_key.to_string()).or_default();

        if matches!(self.cfg.drop_policy, DropPolicy::Reject) && state.items.len() >= self.cfg.cap {
            return EnqueueOutcome::Rejected;
        }

        state.items.push_back(ctx);
        state.last_enqueued_at = Some(now);

        let mut did_summarize = false;
        while state.items.len() > self.cfg.cap {
            state.items.pop_front();
            if matches!(self.cfg.drop_policy, DropPolicy::Summarize) {
                state.summarized_count += 1;
                did_summarize = true;
            }
        }

        if did_summarize {
            EnqueueOutcome::Summarized {
                depth: state.items.len(),
                summarized_count: state.summarized_count,
            }
        } else {
            EnqueueOutcome::Queued { depth: state.items.len() }
        }
    }

    /// Drain all pending items for a session, merging collect-mode
    /// batches into a single prompt body. Returns `None` if nothing is
    /// pending. The session's buffer is cleared atomically with this
    /// read — a concurrent `clear` (abort) racing this call will see
    /// one or the other outcome, never a partial one.
    pub fn drain(&self, session_key: &str) -> Option<DrainResult> {
        let mut sessions = self.sessions.lock();
        let state = sessions.get_mut(session_key)?;
        if state.items.is_empty() {
            return None;
        }

        let contexts: Vec<MsgContext> = state.items.drain(..).collect();
        let summarized_count = state.summarized_count;
        state.summarized_count = 0;
        state.last_enqueued_at = None;

        let mut merged_body = String::new();
        if summarized_count > 0 {
            merged_body.push_str(&format!(
                "[{summarized_count} earlier message{} summarized before this batch]\n",
                if summarized_count == 1 { "" } else { "s" }
            ));
        }
        for (i, c) in contexts.iter().enumerate() {
            if i > 0 {
                merged_body.push('\n');
            }
            merged_body.push_str(&c.body);
        }

        Some(DrainResult {
            merged_body,
            contexts,
            summarized_count,
        })
    }

    /// Clear a session's pending follow-ups without returning them,
    /// called when a turn is aborted.
    pub fn clear(&self, session_key: &str) {
        if let Some(state) = self.sessions.lock().get_mut(session_key) {
            state.items.clear();
            state.summarized_count = 0;
            state.last_enqueued_at = None;
        }
    }

    /// Drop fully-idle session entries (no pending items) to bound
    /// memory growth across long-lived gateways.
    pub fn prune_idle(&self) {
        self.sessions.lock().retain(|_, s| !s.items.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_domain::model::{ChatType, SessionKey};

    fn ctx(body: &str, session_key: &str) -> MsgContext {
        MsgContext {
            body: body.to_string(),
            raw_body: body.to_string(),
            command_body: None,
            from: "user1".to_string(),
            to: "bot".to_string(),
            session_key: SessionKey::from_trusted(session_key),
            account_id: None,
            chat_type: ChatType::Direct,
            provider: "telegram".to_string(),
            surface: None,
            originating_channel: None,
            originating_to: None,
            message_sid: "m1".to_string(),
            sender_id: "user1".to_string(),
            sender_name: None,
            was_mentioned: false,
            command_authorized: false,
            timestamp: Utc::now(),
        }
    }

    fn cfg(mode: FollowupMode, cap: usize, drop_policy: DropPolicy) -> FollowupConfig {
        FollowupConfig {
            mode,
            debounce_ms: 1500,
            cap,
            drop_policy,
        }
    }

    #[test]
    fn collect_merges_in_arrival_order() {
        let q = FollowupQueue::new(cfg(FollowupMode::Collect, 10, DropPolicy::DropOldest));
        let now = Utc::now();
        q.enqueue("s1", ctx("first", "agent:a:main:telegram"), now);
        q.enqueue("s1", ctx("second", "agent:a:main:telegram"), now);

        let drained = q.drain("s1").unwrap();
        assert_eq!(drained.merged_body, "first\nsecond");
        assert_eq!(drained.contexts.len(), 2);
        assert_eq!(q.depth("s1"), 0);
    }

    #[test]
    fn latest_mode_keeps_only_newest() {
        let q = FollowupQueue::new(cfg(FollowupMode::Latest, 10, DropPolicy::DropOldest));
        let now = Utc::now();
        q.enqueue("s1", ctx("first", "agent:a:main:telegram"), now);
        let outcome = q.enqueue("s1", ctx("second", "agent:a:main:telegram"), now);
        assert!(matches!(outcome, EnqueueOutcome::Replaced));

        let drained = q.drain("s1").unwrap();
        assert_eq!(drained.contexts.len(), 1);
        assert_eq!(drained.merged_body, "second");
    }

    #[test]
    fn interrupt_mode_never_queues() {
        let q = FollowupQueue::new(cfg(FollowupMode::Interrupt, 10, DropPolicy::DropOldest));
        let now = Utc::now();
        let outcome = q.enqueue("s1", ctx("now", "agent:a:main:telegram"), now);
        assert!(matches!(outcome, EnqueueOutcome::Interrupt(_)));
        assert_eq!(q.depth("s1"), 0);
        assert!(q.drain("s1").is_none());
    }

    #[test]
    fn drop_oldest_evicts_at_cap() {
        let q = FollowupQueue::new(cfg(FollowupMode::Collect, 2, DropPolicy::DropOldest));
        let now = Utc::now();
        q.enqueue("s1", ctx("a", "agent:a:main:telegram"), now);
        q.enqueue("s1", ctx("b", "agent:a:main:telegram"), now);
        q.enqueue("s1", ctx("c", "agent:a:main:telegram"), now);

        let drained = q.drain("s1").unwrap();
        assert_eq!(drained.merged_body, "b\nc");
    }

    #[test]
    fn reject_policy_drops_new_item_at_cap() {
        let q = FollowupQueue::new(cfg(FollowupMode::Collect, 1, DropPolicy::Reject));
        let now = Utc::now();
        q.enqueue("s1", ctx("a", "agent:a:main:telegram"), now);
        let outcome = q.enqueue("s1", ctx("b", "agent:a:main:telegram"), now);
        assert!(matches!(outcome, EnqueueOutcome::Rejected));

        let drained = q.drain("s1").unwrap();
        assert_eq!(drained.merged_body, "a");
    }

    #[test]
    fn summarize_policy_prefixes_marker() {
        let q = FollowupQueue::new(cfg(FollowupMode::Collect, 1, DropPolicy::Summarize));
        let now = Utc::now();
        q.enqueue("s1", ctx("a", "agent:a:main:telegram"), now);
        let outcome = q.enqueue("s1", ctx("b", "agent:a:main:telegram"), now);
        assert!(matches!(outcome, EnqueueOutcome::Summarized { summarized_count: 1, .. }));

        let drained = q.drain("s1").unwrap();
        assert_eq!(drained.summarized_count, 1);
        assert!(drained.merged_body.starts_with("[1 earlier message summarized"));
        assert!(drained.merged_body.ends_with("b"));
    }

    #[test]
    fn clear_is_atomic_with_drain() {
        let q = FollowupQueue::new(cfg(FollowupMode::Collect, 10, DropPolicy::DropOldest));
        let now = Utc::now();
        q.enqueue("s1", ctx("a", "agent:a:main:telegram"), now);
        q.clear("s1");
        assert!(q.drain("s1").is_none());
    }

    #[test]
    fn debounce_window_reported_until_elapsed() {
        let q = FollowupQueue::new(cfg(FollowupMode::Collect, 10, DropPolicy::DropOldest));
        let now = Utc::now();
        q.enqueue("s1", ctx("a", "agent:a:main:telegram"), now);

        assert!(q.debounce_remaining_ms("s1", now).is_some());
        let later = now + chrono::Duration::milliseconds(2000);
        assert!(q.debounce_remaining_ms("s1", later).is_none());
    }
}
