//! Per-destination ordered reply dispatch (spec.md §4.6).

pub mod destination;
pub mod dispatcher;
pub mod sender;

pub use destination::{Destination, Lane, QueuedCounts};
pub use dispatcher::Dispatcher;
pub use sender::{ChannelSender, SendAck, SendError, TypingController};
