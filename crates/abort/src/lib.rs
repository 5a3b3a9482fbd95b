//! Abort-phrase recognition, abort memory, and sub-agent cascade-stop
//! (spec.md §4.4).

pub mod cascade;
pub mod memory;
pub mod phrases;

pub use cascade::{cascade_stop, SubAgentTree};
pub use memory::AbortMemory;
pub use phrases::{is_abort_trigger, is_abort_trigger_with_extra};

/// Base acknowledgement text sent after a successful fast-abort (spec.md §6).
pub const ABORT_ACK_BASE: &str = "\u{2699}\u{fe0f} Agent was aborted.";

/// Full acknowledgement text, appending the stopped-sub-agent count when
/// it is greater than zero.
pub fn abort_ack_text(stopped_subagents: usize) -> String {
    if stopped_subagents == 0 {
        ABORT_ACK_BASE.to_string()
    } else if stopped_subagents == 1 {
        format!("{ABORT_ACK_BASE} Stopped 1 sub-agent.")
    } else {
        format!("{ABORT_ACK_BASE} Stopped {stopped_subagents} sub-agents.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_text_without_subagents() {
        assert_eq!(abort_ack_text(0), "\u{2699}\u{fe0f} Agent was aborted.");
    }

    #[test]
    fn ack_text_pluralizes() {
        assert_eq!(abort_ack_text(1), "\u{2699}\u{fe0f} Agent was aborted. Stopped 1 sub-agent.");
        assert_eq!(abort_ack_text(2), "\u{2699}\u{fe0f} Agent was aborted. Stopped 2 sub-agents.");
    }
}
