//! The `ChannelAdapter` interface each chat surface implements (spec.md
//! §6). The orchestrator only ever sees [`NormalizedInbound`] — the
//! adapter is responsible for translating Telegram updates, Slack
//! events, IRC lines, etc. into this one shape before it reaches the
//! dispatch pipeline.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;

use oc_domain::model::session_key::InboundMetadata;
use oc_dispatcher::{ChannelSender, SendAck, SendError};
use oc_domain::model::ReplyPayload;

/// Everything the orchestrator needs from one inbound message, before a
/// session key has been computed or access control has run.
#[derive(Debug, Clone)]
pub struct NormalizedInbound {
    pub provider: String,
    pub body: String,
    pub raw_body: String,
    pub from: String,
    pub to: String,
    pub meta: InboundMetadata,
    pub message_sid: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub account_id: Option<String>,
    pub surface: Option<String>,
    pub originating_channel: Option<String>,
    pub originating_to: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub type InboundStream = Pin<Box<dyn Stream<Item = NormalizedInbound> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    Explicit,
    Implicit,
}

pub struct ResolveTargetRequest<'a> {
    pub to: &'a str,
    pub mode: ResolveMode,
    pub allow_from: &'a [String],
}

pub enum ResolveTargetResult {
    Ok { to: String },
    Err { error: String },
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub ok: bool,
    pub bot_identity: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Begin receiving inbound messages. Called once at startup; the
    /// returned stream stays open for the adapter's lifetime.
    fn start(&self) -> InboundStream;

    async fn send(&self, to: &str, text: &str) -> Result<SendAck, SendError>;

    async fn send_media(&self, to: &str, urls: &[String]) -> Result<SendAck, SendError>;

    /// Resolve a user-facing destination string (phone number, channel
    /// handle, `@username`) against the adapter's own addressing rules
    /// and the caller's allow-from list.
    fn resolve_target(&self, req: ResolveTargetRequest<'_>) -> ResolveTargetResult;

    async fn probe(&self) -> ProbeResult;
}

/// Adapts any [`ChannelAdapter`] into the single-method [`ChannelSender`]
/// the dispatcher expects, routing on whether the outgoing payload
/// carries media.
pub struct ChannelAdapterSender<A: ChannelAdapter> {
    adapter: A,
}

impl<A: ChannelAdapter> ChannelAdapterSender<A> {
    pub fn new(adapter: A) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl<A: ChannelAdapter> ChannelSender for ChannelAdapterSender<A> {
    async fn send(&self, to: &str, payload: &ReplyPayload) -> Result<SendAck, SendError> {
        if payload.has_media() {
            self.adapter.send_media(to, &payload.media_urls).await
        } else {
            self.adapter.send(to, payload.text.as_deref().unwrap_or("")).await
        }
    }
}
