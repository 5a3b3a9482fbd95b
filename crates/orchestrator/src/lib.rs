//! Inbound Orchestrator and Agent Event Handler (spec.md §4.7, §4.9), plus
//! the supporting registries (dedupe, session-create rate limit, run
//! registry, sub-agent registry) and the external-collaborator interfaces
//! this crate drives against (`ChannelAdapter`, `AgentRunner`, spec.md §6).

pub mod agent_runner;
pub mod channel_adapter;
pub mod dedupe;
pub mod event_handler;
pub mod mention;
pub mod pipeline;
pub mod rate_limit;
pub mod run_registry;
pub mod subagent_registry;

pub use agent_runner::{AgentEvent, AgentRunner, EventStream, RunRequest};
pub use channel_adapter::{
    ChannelAdapter, ChannelAdapterSender, InboundStream, NormalizedInbound, ProbeResult,
    ResolveMode, ResolveTargetRequest, ResolveTargetResult,
};
pub use dedupe::DedupeStore;
pub use event_handler::{AgentEventHandler, DriveOutcome, MessagingToolTracker, RunEventSink};
pub use mention::was_mentioned;
pub use pipeline::{InboundOrchestrator, MessageOutcome};
pub use rate_limit::SessionCreateLimiter;
pub use run_registry::{CancelToken, RunRegistry};
pub use subagent_registry::{CascadeView, SubAgentRegistry};
