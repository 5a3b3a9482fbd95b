//! The `AgentRunner` interface consumed by the orchestrator (spec.md §6).
//!
//! `run` returns a push-based event stream rather than a single future —
//! modeled as a boxed [`futures_core::Stream`] so any async generator
//! (an LLM SDK's own stream, a channel-backed adapter, a test fixture)
//! can be wrapped without pulling in a streaming-specific crate the
//! teacher doesn't already depend on.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use serde_json::Value;

use oc_domain::model::{ReplyPayload, SessionKey};

#[derive(Debug, Clone)]
pub enum AgentEvent {
    ToolStart {
        tool_call_id: String,
        name: String,
        args: Value,
    },
    ToolUpdate {
        tool_call_id: String,
        partial_output: Option<String>,
    },
    ToolEnd {
        tool_call_id: String,
        output: Value,
        success: bool,
    },
    /// Cumulative assistant text emitted so far this turn. The event
    /// handler diffs against `sentTextLength` to find the new suffix.
    Delta {
        text_so_far: String,
        is_reasoning: bool,
    },
    Final {
        payload: ReplyPayload,
    },
    Aborted,
    Error {
        message: String,
    },
}

pub type EventStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub session_key: SessionKey,
    pub message: String,
    pub attachments: Vec<String>,
    pub idempotency_key: String,
    pub thinking: bool,
    pub timeout_ms: i64,
    pub auth_profile_id: Option<String>,
}

#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, request: RunRequest) -> EventStream;
    async fn abort(&self, session_key: &SessionKey);
}
