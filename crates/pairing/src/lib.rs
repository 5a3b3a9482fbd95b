//! Pairing store (spec.md §4.2): per-channel pending pairing requests and
//! persisted allowlists, mutated atomically under a file lock shared with
//! [`oc_sessions::lock`].

pub mod store;

pub use store::{ApproveOutcome, PairingStore, UpsertOutcome};
