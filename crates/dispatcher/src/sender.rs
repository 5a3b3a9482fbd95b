//! The outbound edge the dispatcher drives: one `ChannelSender` per
//! channel adapter, plus the typing/composing hooks the orchestrator
//! drives around a dispatch (spec.md §4.6, §6).

use async_trait::async_trait;
use oc_domain::model::ReplyPayload;

#[derive(Debug, Clone, Default)]
pub struct SendAck {
    pub message_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("transport error sending to {to}: {reason}")]
    Transport { to: String, reason: String },
}

/// What the dispatcher calls to actually deliver a payload. Implemented
/// once per channel adapter (Telegram, Slack, Discord, …) in the gateway
/// binary; the dispatcher itself never knows which channel it is talking
/// to.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(&self, to: &str, payload: &ReplyPayload) -> Result<SendAck, SendError>;
}

/// Typing/composing indicator hooks, supplied by the channel adapter.
/// The dispatcher does not call these itself — the orchestrator drives
/// them around a dispatch, calling `mark_dispatch_idle` once
/// [`crate::Destination::wait_for_idle`] resolves (spec.md §4.6).
pub trait TypingController: Send + Sync {
    fn on_reply_start(&self);
    fn start_typing_loop(&self);
    fn mark_dispatch_idle(&self);
    fn cleanup(&self);
}
