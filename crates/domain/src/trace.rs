use serde::Serialize;

/// Structured trace events emitted across the gateway's core components.
///
/// Each variant is serialized to a single `trace_event` JSON field on an
/// `info!` record, so a log pipeline can index on `event` without parsing
/// free-text messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionResolved {
        session_key: String,
        session_id: String,
        is_new: bool,
    },
    SessionReset {
        session_key: String,
        old_session_id: String,
        new_session_id: String,
        reason: String,
    },
    SessionLockStale {
        path: String,
        held_pid: Option<i32>,
    },
    PairingCreated {
        channel: String,
        code: String,
    },
    PairingApproved {
        channel: String,
        id: String,
    },
    PairingEvicted {
        channel: String,
        id: String,
    },
    AccessDropped {
        session_key: String,
        reason: String,
    },
    FastAbortTriggered {
        session_key: String,
        stopped_subagents: usize,
    },
    DispatchFinal {
        destination: String,
        run_id: String,
    },
    DispatchReasoningSuppressed {
        destination: String,
    },
    AuthProfileCooldown {
        profile_id: String,
        reason: String,
        until: chrono::DateTime<chrono::Utc>,
    },
    AuthProfileDisabled {
        profile_id: String,
        until: chrono::DateTime<chrono::Utc>,
    },
    FollowupDropped {
        session_key: String,
        policy: String,
    },
    FollowupDrained {
        session_key: String,
        batched: usize,
        summarized_count: usize,
    },
    DedupeSkipped {
        dedupe_key: String,
    },
    MessageProcessed {
        session_key: String,
        outcome: String,
        reason: Option<String>,
    },
    SubAgentSpawned {
        child_session_key: String,
        requester_session_key: String,
    },
    SubAgentCascadeStopped {
        root_session_key: String,
        stopped_count: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "oc_event");
    }
}
