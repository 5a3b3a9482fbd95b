//! Per-session follow-up queue (spec.md §4.5): while an agent turn is in
//! flight, later inbound messages for the same session key enqueue here
//! instead of starting a second concurrent run.

pub mod queue;

pub use queue::{DrainResult, EnqueueOutcome, FollowupQueue};
