//! The Inbound Orchestrator (spec.md §4.7): end-to-end handling of one
//! inbound message — dedupe, fast-abort, access control, session
//! bookkeeping, agent invocation, and dispatcher glue. This is the
//! component every other piece in this workspace exists to serve.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use oc_abort::{abort_ack_text, cascade_stop, is_abort_trigger_with_extra, AbortMemory};
use oc_access::{AccessDecision, AccessInput, CommandSurface, Evaluator};
use oc_auth_profiles::AuthProfileStore;
use oc_dispatcher::{ChannelSender, Dispatcher};
use oc_domain::config::Config;
use oc_domain::error::Result;
use oc_domain::model::session_key::{compute_session_key, ChatType as KeyChatType};
use oc_domain::model::{ChatType, MsgContext, ReplyPayload, SessionKey};
use oc_domain::trace::TraceEvent;
use oc_followup::FollowupQueue;
use oc_pairing::PairingStore;
use oc_sessions::SessionStore;

use crate::agent_runner::{AgentRunner, RunRequest};
use crate::channel_adapter::NormalizedInbound;
use crate::dedupe::DedupeStore;
use crate::event_handler::{AgentEventHandler, MessagingToolTracker, RunEventSink};
use crate::mention::was_mentioned;
use crate::rate_limit::SessionCreateLimiter;
use crate::run_registry::RunRegistry;
use crate::subagent_registry::{CascadeView, SubAgentRegistry};

/// Terminal outcome of [`InboundOrchestrator::handle_inbound`], the shape
/// fed to the `message_processed` diagnostic (spec.md §4.7 step 9, §7).
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    Completed,
    Aborted { stopped_subagents: usize },
    Dropped { reason: String },
    Skipped { reason: String },
    Errored { reason: String },
}

impl MessageOutcome {
    fn label(&self) -> &'static str {
        match self {
            MessageOutcome::Completed | MessageOutcome::Aborted { .. } => "completed",
            MessageOutcome::Dropped { .. } => "dropped",
            MessageOutcome::Skipped { .. } => "skipped",
            MessageOutcome::Errored { .. } => "errored",
        }
    }

    fn reason(&self) -> Option<String> {
        match self {
            MessageOutcome::Dropped { reason } | MessageOutcome::Skipped { reason } | MessageOutcome::Errored { reason } => {
                Some(reason.clone())
            }
            _ => None,
        }
    }
}

/// Bridges a [`oc_dispatcher::Destination`] and the channel sender for
/// one run's reply-to destination into the [`RunEventSink`] the event
/// handler drives.
struct DestinationSink {
    destination: Arc<oc_dispatcher::Destination>,
    sender: Arc<dyn ChannelSender>,
    to: String,
}

#[async_trait]
impl RunEventSink for DestinationSink {
    async fn on_tool_result(&self, payload: ReplyPayload) {
        self.destination.send_tool_result(self.sender.as_ref(), &self.to, payload).await;
    }

    async fn on_block_reply(&self, payload: ReplyPayload) {
        self.destination.send_block_reply(self.sender.as_ref(), &self.to, payload).await;
    }
}

/// Everything the orchestrator needs to resolve and drive one turn,
/// assembled once at gateway startup and shared across every inbound
/// message.
pub struct InboundOrchestrator {
    config: Arc<Config>,
    sessions: Arc<SessionStore>,
    pairing: Arc<PairingStore>,
    #[allow(dead_code)]
    auth_profiles: Arc<AuthProfileStore>,
    dedupe: DedupeStore,
    abort_memory: AbortMemory,
    followups: FollowupQueue,
    dispatcher: Dispatcher,
    run_registry: Arc<RunRegistry>,
    subagents: Arc<SubAgentRegistry>,
    session_create_limiter: SessionCreateLimiter,
    event_handler: AgentEventHandler,
    agent_runner: Arc<dyn AgentRunner>,
    channel_senders: HashMap<String, Arc<dyn ChannelSender>>,
}

impl InboundOrchestrator {
    pub fn new(config: Arc<Config>, agent_runner: Arc<dyn AgentRunner>, channel_senders: HashMap<String, Arc<dyn ChannelSender>>) -> Self {
        let sessions = Arc::new(SessionStore::new(config.sessions.clone()));
        let pairing_base = std::path::PathBuf::from("data/pairing");
        let pairing = Arc::new(PairingStore::new(pairing_base, config.pairing.clone()));
        let auth_profile_path = std::path::PathBuf::from(&config.auth_profiles.store_path);
        let auth_profiles = Arc::new(AuthProfileStore::new(auth_profile_path));
        let run_registry = Arc::new(RunRegistry::new());
        let subagents = Arc::new(SubAgentRegistry::new());
        let messaging_tracker = Arc::new(MessagingToolTracker::new(2000));
        let event_handler = AgentEventHandler::new(run_registry.clone(), messaging_tracker);

        Self {
            dedupe: DedupeStore::new(10_000),
            abort_memory: AbortMemory::new(config.abort.memory_cap),
            followups: FollowupQueue::new(config.followup.clone()),
            dispatcher: Dispatcher::new(),
            session_create_limiter: SessionCreateLimiter::new(
                config.dispatcher.session_create_rate_limit,
                config.dispatcher.session_create_rate_window_ms,
            ),
            sessions,
            pairing,
            auth_profiles,
            run_registry,
            subagents,
            event_handler,
            agent_runner,
            channel_senders,
            config,
        }
    }

    fn sender_for(&self, channel: &str) -> Option<Arc<dyn ChannelSender>> {
        self.channel_senders.get(channel).cloned()
    }

    /// Handle one normalized inbound message for `agent_id`. Choosing
    /// *which* agent a message is routed to is an external collaborator's
    /// job (spec.md §1) — the caller already knows it by the time it
    /// reaches this entry point.
    pub async fn handle_inbound(&self, inbound: NormalizedInbound, agent_id: &str) -> Result<MessageOutcome> {
        let now = inbound.timestamp;
        let reply_channel = inbound.originating_channel.clone().unwrap_or_else(|| inbound.provider.clone());
        let reply_to = inbound.originating_to.clone().unwrap_or_else(|| inbound.to.clone());

        // 1. Dedupe.
        let dedupe_identity = inbound.originating_channel.as_deref().unwrap_or(&inbound.provider);
        let dedupe_key = DedupeStore::dedupe_key(dedupe_identity, &inbound.to, &inbound.message_sid);
        if self.dedupe.check_and_insert(&dedupe_key) {
            TraceEvent::DedupeSkipped { dedupe_key }.emit();
            return Ok(self.finish(MessageOutcome::Skipped { reason: "duplicate".to_string() }, None));
        }

        let chat_type = if inbound.meta.is_cron {
            ChatType::Cron
        } else if inbound.meta.is_direct {
            ChatType::Direct
        } else {
            ChatType::Group
        };
        let session_key = compute_session_key(agent_id, self.config.sessions.dm_scope, &inbound.meta);

        // 2. Fast-abort — independent of command-gate config (spec.md §4.4).
        if is_abort_trigger_with_extra(&inbound.body, &self.config.abort.extra_phrases) {
            return Ok(self.finish(self.handle_fast_abort(&session_key, &reply_channel, &reply_to, now).await, None));
        }

        // 3. Access control.
        let is_command = inbound.body.trim_start().starts_with('/');
        let was_mentioned_flag = chat_type == ChatType::Group
            && was_mentioned(&inbound.body, self.config.access.group.mention_pattern.as_deref());
        let authorized_by_allowlist = self.is_command_authorized(&inbound);

        let evaluator = Evaluator {
            access: &self.config.access,
            pairing_cfg: &self.config.pairing,
            pairing_store: &self.pairing,
        };
        let config_dm_allow_from = self.config.access.dm_allow_from(&inbound.provider);
        let config_group_allow_from = self.config.access.group_allow_from(&inbound.provider);
        let access_input = AccessInput {
            chat_type: to_key_chat_type(chat_type),
            channel: &inbound.provider,
            sender_id: &inbound.sender_id,
            group_id: inbound.meta.group_id.as_deref(),
            config_dm_allow_from,
            config_group_allow_from,
            is_command,
            command_surface: CommandSurface::Text,
            command_authorized_by_allowlist: authorized_by_allowlist,
            was_mentioned: was_mentioned_flag,
            message_timestamp: inbound.timestamp,
            connected_at: now,
        };

        match evaluator.evaluate(&access_input).await? {
            AccessDecision::DropSilent { reason } | AccessDecision::CommandDropped { reason } => {
                return Ok(self.finish(MessageOutcome::Dropped { reason }, None));
            }
            AccessDecision::PairingReply { code, created } => {
                if created {
                    if let Some(sender) = self.sender_for(&reply_channel) {
                        let text = format!("To finish pairing, send this code back: {code} (from {})", inbound.sender_id);
                        let _ = sender.send(&reply_to, &ReplyPayload::text(text)).await;
                    }
                }
                return Ok(self.finish(MessageOutcome::Completed, None));
            }
            AccessDecision::Allow => {}
        }

        // 4. Hook emission — internal/external plugin hooks are an
        // external collaborator surface (spec.md §1); this core only
        // leaves the trace breadcrumb a hook subscriber would key off.
        tracing::info!(session_key = %session_key, provider = %inbound.provider, "message_received");

        // 5/6. Route resolve + context finalize.
        let store_path = self.sessions.resolve_store_path(None, agent_id);
        let previously_existed = self.sessions.read_updated_at(&store_path, &session_key).await?.is_some();
        if !previously_existed && !self.session_create_limiter.try_acquire(agent_id, now) {
            return Ok(self.finish(
                MessageOutcome::Errored {
                    reason: "session creation rate limit exceeded".to_string(),
                },
                None,
            ));
        }

        if inbound.body.len() > self.config.dispatcher.prompt_size_guard_bytes {
            return Ok(self.finish(
                MessageOutcome::Errored {
                    reason: "prompt exceeds size guard".to_string(),
                },
                None,
            ));
        }

        let ctx = MsgContext {
            body: inbound.body.clone(),
            raw_body: inbound.raw_body.clone(),
            command_body: is_command.then(|| inbound.body.clone()),
            from: inbound.from.clone(),
            to: inbound.to.clone(),
            session_key: session_key.clone(),
            account_id: inbound.account_id.clone(),
            chat_type,
            provider: inbound.provider.clone(),
            surface: inbound.surface.clone(),
            originating_channel: inbound.originating_channel.clone(),
            originating_to: inbound.originating_to.clone(),
            message_sid: inbound.message_sid.clone(),
            sender_id: inbound.sender_id.clone(),
            sender_name: inbound.sender_name.clone(),
            was_mentioned: was_mentioned_flag,
            command_authorized: authorized_by_allowlist,
            timestamp: inbound.timestamp,
        };
        self.sessions.record_inbound(&store_path, &session_key, &ctx).await?;

        // 7. If a turn is already in flight for this session, this
        // message becomes a follow-up instead of a second concurrent run.
        if self.run_registry.is_active(&session_key) {
            self.followups.enqueue(session_key.as_str(), ctx, now);
            return Ok(self.finish(MessageOutcome::Skipped { reason: "queued as follow-up".to_string() }, None));
        }

        let mut outcome = self.run_turn(&session_key, &ctx).await;

        // 8. Re-entry: messages that arrived while this turn was active
        // were queued rather than dropped (step 7 above). Drain and run
        // them now instead of leaving them stranded — spec.md §2's "the
        // Follow-up Queue may re-enter the Inbound Orchestrator" and
        // §4.5's "...instead of starting a second concurrent run", which
        // implies the queued message is still eventually run.
        while let Some(drained) = self.followups.drain(session_key.as_str()) {
            TraceEvent::FollowupDrained {
                session_key: session_key.as_str().to_string(),
                batched: drained.contexts.len(),
                summarized_count: drained.summarized_count,
            }
            .emit();

            let mut next_ctx = drained.contexts.last().cloned().expect("drain never returns an empty batch");
            next_ctx.body = drained.merged_body;
            next_ctx.raw_body = next_ctx.body.clone();
            outcome = self.run_turn(&session_key, &next_ctx).await;
        }

        Ok(self.finish(outcome, Some(&ctx)))
    }

    async fn run_turn(&self, session_key: &SessionKey, ctx: &MsgContext) -> MessageOutcome {
        let now = ctx.timestamp;
        let idempotency_key = Uuid::new_v4().to_string();
        let (prompt, _cancel) = self.run_registry.start(session_key.clone(), idempotency_key.clone(), now);

        let Some(sender) = self.sender_for(ctx.reply_channel()) else {
            self.run_registry.resolve(session_key, oc_domain::model::TerminalState::Refusal);
            return MessageOutcome::Errored {
                reason: format!("no channel sender registered for {}", ctx.reply_channel()),
            };
        };

        let destination_key = Dispatcher::destination_key(ctx.reply_channel(), ctx.reply_to());
        let destination = self.dispatcher.destination(&destination_key);

        let request = RunRequest {
            session_key: session_key.clone(),
            message: ctx.body.clone(),
            attachments: Vec::new(),
            idempotency_key,
            thinking: false,
            timeout_ms: self.config.dispatcher.run_timeout_ms,
            auth_profile_id: None,
        };

        let events = self.agent_runner.run(request).await;
        let sink = DestinationSink {
            destination: destination.clone(),
            sender: sender.clone(),
            to: ctx.reply_to().to_string(),
        };

        let is_group = matches!(ctx.chat_type, ChatType::Group | ChatType::Channel);
        let outcome = self.event_handler.drive(session_key, is_group, events, &sink).await;

        if let Some(payload) = outcome.final_payload.clone() {
            if matches!(outcome.terminal, oc_domain::model::TerminalState::EndTurn | oc_domain::model::TerminalState::Refusal) {
                destination.send_final_reply(sender.as_ref(), ctx.reply_to(), payload, prompt.run_id).await;
            }
        }

        destination.mark_complete(prompt.run_id);
        destination.wait_for_idle().await;

        match outcome.terminal {
            oc_domain::model::TerminalState::EndTurn => MessageOutcome::Completed,
            oc_domain::model::TerminalState::Cancelled => MessageOutcome::Aborted { stopped_subagents: 0 },
            oc_domain::model::TerminalState::Refusal => MessageOutcome::Errored {
                reason: "agent runner emitted an error".to_string(),
            },
        }
    }

    async fn handle_fast_abort(&self, session_key: &SessionKey, reply_channel: &str, reply_to: &str, now: DateTime<Utc>) -> MessageOutcome {
        self.abort_memory.mark_aborted(session_key.as_str(), now);
        self.followups.clear(session_key.as_str());

        let view = CascadeView {
            subagents: &self.subagents,
            runs: &self.run_registry,
        };
        let stopped = cascade_stop(&view, session_key.as_str());

        TraceEvent::FastAbortTriggered {
            session_key: session_key.as_str().to_string(),
            stopped_subagents: stopped.saturating_sub(1),
        }
        .emit();

        if let Some(sender) = self.sender_for(reply_channel) {
            let text = abort_ack_text(stopped.saturating_sub(1));
            let destination = self.dispatcher.destination(&Dispatcher::destination_key(reply_channel, reply_to));
            destination.send_block_reply(sender.as_ref(), reply_to, ReplyPayload::text(text)).await;
            destination.wait_for_idle().await;
        }

        MessageOutcome::Aborted {
            stopped_subagents: stopped.saturating_sub(1),
        }
    }

    /// Whether `inbound`'s sender may issue control commands: membership
    /// in any configured access-group, or in the channel's configured
    /// DM/group allowlist, regardless of the channel's general policy
    /// (spec.md §4.3 step 6 command-gate).
    fn is_command_authorized(&self, inbound: &NormalizedInbound) -> bool {
        let in_access_group = self
            .config
            .access
            .access_groups
            .values()
            .any(|members| members.iter().any(|m| m == &inbound.sender_id));
        let in_channel_allowlist = self
            .config
            .access
            .dm_allow_from(&inbound.provider)
            .iter()
            .chain(self.config.access.group_allow_from(&inbound.provider).iter())
            .any(|m| m == &inbound.sender_id);
        in_access_group || in_channel_allowlist
    }

    fn finish(&self, outcome: MessageOutcome, ctx: Option<&MsgContext>) -> MessageOutcome {
        TraceEvent::MessageProcessed {
            session_key: ctx.map(|c| c.session_key.as_str().to_string()).unwrap_or_default(),
            outcome: outcome.label().to_string(),
            reason: outcome.reason(),
        }
        .emit();
        outcome
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn run_registry(&self) -> &RunRegistry {
        &self.run_registry
    }

    pub fn subagents(&self) -> &SubAgentRegistry {
        &self.subagents
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn pairing(&self) -> &PairingStore {
        &self.pairing
    }

    pub fn auth_profiles(&self) -> &AuthProfileStore {
        &self.auth_profiles
    }
}

fn to_key_chat_type(chat_type: ChatType) -> KeyChatType {
    match chat_type {
        ChatType::Direct => KeyChatType::Direct,
        ChatType::Group => KeyChatType::Group,
        ChatType::Channel => KeyChatType::Channel,
        ChatType::Cron => KeyChatType::Cron,
        ChatType::Subagent => KeyChatType::Subagent,
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;

    use futures_core::Stream;
    use parking_lot::Mutex;

    use oc_domain::model::session_key::InboundMetadata;
    use oc_dispatcher::{SendAck, SendError};

    use crate::agent_runner::{AgentEvent, EventStream};

    use super::*;

    struct FakeSender {
        sent: Mutex<Vec<(String, ReplyPayload)>>,
    }

    #[async_trait]
    impl ChannelSender for FakeSender {
        async fn send(&self, to: &str, payload: &ReplyPayload) -> std::result::Result<SendAck, SendError> {
            self.sent.lock().push((to.to_string(), payload.clone()));
            Ok(SendAck::default())
        }
    }

    struct FakeRunner {
        payload: ReplyPayload,
    }

    #[async_trait]
    impl AgentRunner for FakeRunner {
        async fn run(&self, _request: RunRequest) -> EventStream {
            let payload = self.payload.clone();
            let events = vec![AgentEvent::Final { payload }];
            Box::pin(futures_util::stream::iter(events)) as Pin<Box<dyn Stream<Item = AgentEvent> + Send>>
        }

        async fn abort(&self, _session_key: &SessionKey) {}
    }

    fn inbound(body: &str, sid: &str) -> NormalizedInbound {
        NormalizedInbound {
            provider: "telegram".to_string(),
            body: body.to_string(),
            raw_body: body.to_string(),
            from: "+15550001111".to_string(),
            to: "bot".to_string(),
            meta: InboundMetadata {
                channel: Some("telegram".to_string()),
                peer_id: Some("+15550001111".to_string()),
                is_direct: true,
                ..Default::default()
            },
            message_sid: sid.to_string(),
            sender_id: "+15550001111".to_string(),
            sender_name: None,
            account_id: None,
            surface: None,
            originating_channel: None,
            originating_to: None,
            timestamp: Utc::now(),
        }
    }

    fn orchestrator(sender: Arc<FakeSender>, reply: &str) -> InboundOrchestrator {
        let mut config = Config::default();
        config.access.dm_policy = oc_domain::config::DmPolicy::Open;
        let dir = tempfile::tempdir().unwrap();
        config.sessions.store_path = dir.path().join("sessions.json").to_string_lossy().to_string();
        std::mem::forget(dir);

        let runner = Arc::new(FakeRunner { payload: ReplyPayload::text(reply) });
        let mut senders: HashMap<String, Arc<dyn ChannelSender>> = HashMap::new();
        senders.insert("telegram".to_string(), sender);
        InboundOrchestrator::new(Arc::new(config), runner, senders)
    }

    #[tokio::test]
    async fn happy_path_delivers_final_reply() {
        let sender = Arc::new(FakeSender { sent: Mutex::new(Vec::new()) });
        let orch = orchestrator(sender.clone(), "hello there");

        let outcome = orch.handle_inbound(inbound("hi", "msg-1"), "bot1").await.unwrap();
        assert_eq!(outcome, MessageOutcome::Completed);

        let sent = sender.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.text.as_deref(), Some("hello there"));
    }

    #[tokio::test]
    async fn duplicate_message_sid_is_skipped() {
        let sender = Arc::new(FakeSender { sent: Mutex::new(Vec::new()) });
        let orch = orchestrator(sender.clone(), "hello there");

        orch.handle_inbound(inbound("hi", "dup-1"), "bot1").await.unwrap();
        let second = orch.handle_inbound(inbound("hi", "dup-1"), "bot1").await.unwrap();

        assert_eq!(second, MessageOutcome::Skipped { reason: "duplicate".to_string() });
        assert_eq!(sender.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn fast_abort_short_circuits_before_agent_invocation() {
        let sender = Arc::new(FakeSender { sent: Mutex::new(Vec::new()) });
        let orch = orchestrator(sender.clone(), "should never be sent");

        let outcome = orch.handle_inbound(inbound("/stop", "msg-2"), "bot1").await.unwrap();
        assert!(matches!(outcome, MessageOutcome::Aborted { stopped_subagents: 0 }));

        let sent = sender.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.text.as_deref(), Some("\u{2699}\u{fe0f} Agent was aborted."));
    }

    #[tokio::test]
    async fn group_message_without_mention_is_dropped() {
        let sender = Arc::new(FakeSender { sent: Mutex::new(Vec::new()) });
        let mut config = Config::default();
        config.access.dm_policy = oc_domain::config::DmPolicy::Open;
        config.access.group.policy = oc_domain::config::GroupPolicy::Open;
        config.access.group.require_mention = true;
        config.access.group.mention_pattern = Some("@openclaw".to_string());
        let dir = tempfile::tempdir().unwrap();
        config.sessions.store_path = dir.path().join("sessions.json").to_string_lossy().to_string();
        std::mem::forget(dir);

        let runner = Arc::new(FakeRunner { payload: ReplyPayload::text("should not run") });
        let mut senders: HashMap<String, Arc<dyn ChannelSender>> = HashMap::new();
        senders.insert("discord".to_string(), sender.clone());
        let orch = InboundOrchestrator::new(Arc::new(config), runner, senders);

        let mut msg = inbound("hello", "msg-3");
        msg.provider = "discord".to_string();
        msg.meta.is_direct = false;
        msg.meta.group_id = Some("server1".to_string());
        msg.meta.channel = Some("discord".to_string());

        let outcome = orch.handle_inbound(msg, "bot1").await.unwrap();
        assert!(matches!(outcome, MessageOutcome::Dropped { .. }));
        assert!(sender.sent.lock().is_empty());
    }
}
