//! Structural parent→child map for sub-agent spawns (spec.md §5), plus a
//! [`oc_abort::SubAgentTree`] view over it combined with [`RunRegistry`]
//! for cascade stop.
//!
//! Tree edges are never stored as pointers — only [`SubAgentRun`] records
//! keyed by the child's own session key, which already encodes the
//! parent relationship via the `:subagent:` prefix convention
//! ([`SessionKey::is_descendant_of`]). `children_of` still needs an
//! explicit `requester_session_key` field rather than re-deriving
//! adjacency from string prefixes every call, since a parent may have
//! spawned several children needing a fast exact-match lookup.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;

use oc_abort::SubAgentTree;
use oc_domain::model::{SessionKey, SubAgentCleanup, SubAgentRun, TerminalState};
use oc_domain::trace::TraceEvent;

use crate::run_registry::RunRegistry;

#[derive(Default)]
pub struct SubAgentRegistry {
    runs: Mutex<HashMap<SessionKey, SubAgentRun>>,
}

impl SubAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&self, requester: SessionKey, child: SessionKey, task: impl Into<String>, cleanup: SubAgentCleanup) -> SubAgentRun {
        let run = SubAgentRun {
            run_id: uuid::Uuid::new_v4(),
            child_session_key: child.clone(),
            requester_session_key: requester.clone(),
            task: task.into(),
            cleanup,
            created_at: Utc::now(),
            ended_at: None,
            outcome: None,
        };
        self.runs.lock().insert(child.clone(), run.clone());

        TraceEvent::SubAgentSpawned {
            child_session_key: child.as_str().to_string(),
            requester_session_key: requester.as_str().to_string(),
        }
        .emit();

        run
    }

    /// Active (non-ended) direct children of `parent`, as session-key
    /// strings (the shape [`oc_abort::SubAgentTree`] expects).
    pub fn children_of(&self, parent: &str) -> Vec<String> {
        self.runs
            .lock()
            .values()
            .filter(|r| r.is_active() && r.requester_session_key.as_str() == parent)
            .map(|r| r.child_session_key.as_str().to_string())
            .collect()
    }

    pub fn is_active(&self, child: &SessionKey) -> bool {
        self.runs.lock().get(child).map(|r| r.is_active()).unwrap_or(false)
    }

    pub fn mark_terminated(&self, child: &SessionKey, outcome: TerminalState) {
        if let Some(run) = self.runs.lock().get_mut(child) {
            if run.ended_at.is_none() {
                run.ended_at = Some(Utc::now());
                run.outcome = Some(outcome);
            }
        }
    }

    pub fn cleanup_policy(&self, child: &SessionKey) -> Option<SubAgentCleanup> {
        self.runs.lock().get(child).map(|r| r.cleanup)
    }

    /// Whether `agent_id` may spawn sub-agents at all, per
    /// `DispatcherConfig.allow_agents` (`*` permits any).
    pub fn agent_allowed(allow_agents: &[String], agent_id: &str) -> bool {
        allow_agents.iter().any(|a| a == "*" || a == agent_id)
    }
}

/// Ties [`SubAgentRegistry`] (structure) and [`RunRegistry`] (liveness)
/// together into the single view [`oc_abort::cascade_stop`] needs.
pub struct CascadeView<'a> {
    pub subagents: &'a SubAgentRegistry,
    pub runs: &'a RunRegistry,
}

impl SubAgentTree for CascadeView<'_> {
    fn direct_children(&self, session_key: &str) -> Vec<String> {
        self.subagents.children_of(session_key)
    }

    fn is_ended(&self, session_key: &str) -> bool {
        let key = SessionKey::canonicalize(session_key);
        !self.runs.is_active(&key)
    }

    fn mark_stopped(&self, session_key: &str) -> bool {
        let key = SessionKey::canonicalize(session_key);
        let was_active = self.runs.cancel_and_resolve(&key);
        self.subagents.mark_terminated(&key, TerminalState::Cancelled);
        was_active
    }
}
