//! Auth-profile store and selector (spec.md §3 AuthProfile, §4.8).

pub mod backoff;
pub mod selector;
pub mod store;

pub use selector::{SelectOutcome, Selector};
pub use store::AuthProfileStore;
