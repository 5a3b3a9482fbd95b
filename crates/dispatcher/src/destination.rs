//! One destination's ordered reply queue (spec.md §4.6).
//!
//! Ordering is enforced the way the session-lock map enforces per-session
//! exclusivity: a single `tokio::sync::Mutex` acts as the chain — each
//! call awaits it (joining the "promise-of-promises" in FIFO order),
//! does its send, then releases it for the next. `wait_for_idle` simply
//! acquires and immediately releases the same mutex: by the time that
//! succeeds, every payload enqueued before the call has already run.

use std::collections::HashSet;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use oc_domain::model::ReplyPayload;

use crate::sender::{ChannelSender, SendError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Tool,
    Block,
    Final,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueuedCounts {
    pub tool: usize,
    pub block: usize,
    pub final_pending: usize,
}

struct Counts(Mutex<QueuedCounts>);

impl Counts {
    fn bump(&self, lane: Lane, delta: i64) {
        let mut c = self.0.lock();
        let field = match lane {
            Lane::Tool => &mut c.tool,
            Lane::Block => &mut c.block,
            Lane::Final => &mut c.final_pending,
        };
        *field = (*field as i64 + delta).max(0) as usize;
    }
}

/// One logical reply queue, scoped to a single destination (typically a
/// `provider:to` pair).
pub struct Destination {
    chain: AsyncMutex<()>,
    counts: Counts,
    delivered_final: Mutex<HashSet<Uuid>>,
}

impl Default for Destination {
    fn default() -> Self {
        Self::new()
    }
}

impl Destination {
    pub fn new() -> Self {
        Self {
            chain: AsyncMutex::new(()),
            counts: Counts(Mutex::new(QueuedCounts::default())),
            delivered_final: Mutex::new(HashSet::new()),
        }
    }

    pub fn queued_counts(&self) -> QueuedCounts {
        *self.counts.0.lock()
    }

    /// Wait until every payload enqueued before this call has been sent.
    pub async fn wait_for_idle(&self) {
        let _guard = self.chain.lock().await;
    }

    /// Drop bookkeeping for a finished run (its final-delivery marker,
    /// if any). Call once the run's outcome has been recorded.
    pub fn mark_complete(&self, run_id: Uuid) {
        self.delivered_final.lock().remove(&run_id);
    }

    pub async fn send_tool_result(&self, sender: &dyn ChannelSender, to: &str, payload: ReplyPayload) -> bool {
        self.enqueue(Lane::Tool, sender, to, payload, None).await
    }

    pub async fn send_block_reply(&self, sender: &dyn ChannelSender, to: &str, payload: ReplyPayload) -> bool {
        self.enqueue(Lane::Block, sender, to, payload, None).await
    }

    /// Delivers at most once per `run_id` — a second call for a run that
    /// already delivered its final reply is a no-op returning `false`.
    pub async fn send_final_reply(
        &self,
        sender: &dyn ChannelSender,
        to: &str,
        payload: ReplyPayload,
        run_id: Uuid,
    ) -> bool {
        {
            let mut delivered = self.delivered_final.lock();
            if !delivered.insert(run_id) {
                return false;
            }
        }
        self.enqueue(Lane::Final, sender, to, payload, Some(run_id)).await
    }

    async fn enqueue(
        &self,
        lane: Lane,
        sender: &dyn ChannelSender,
        to: &str,
        payload: ReplyPayload,
        run_id: Option<Uuid>,
    ) -> bool {
        if payload.is_reasoning {
            return false;
        }
        if payload.is_empty_payload() {
            return false;
        }

        self.counts.bump(lane, 1);
        let guard = self.chain.lock().await;
        let result = sender.send(to, &payload).await;
        drop(guard);
        self.counts.bump(lane, -1);

        match result {
            Ok(_) => true,
            Err(SendError::Transport { to, reason }) => {
                tracing::warn!(to, reason, lane = ?lane, run_id = ?run_id, "dispatcher send failed");
                false
            }
        }
    }
}
