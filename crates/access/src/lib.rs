//! Access control decision procedure (spec.md §4.3): DM/group policy
//! evaluation, allowlist matching, pairing-grace, command-gate, and
//! mention-gate, in the exact order the spec lists them.

pub mod policy;

pub use policy::{AccessDecision, AccessInput, CommandSurface, Evaluator};
