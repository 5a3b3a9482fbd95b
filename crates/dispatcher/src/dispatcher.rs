//! Per-destination [`Destination`] registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::destination::Destination;

/// Looks up (creating on first use) the ordered reply queue for a
/// destination key. Callers choose the key shape — typically
/// `"<provider>:<to>"` so cross-channel routing naturally lands on a
/// distinct destination from the originating one.
#[derive(Default)]
pub struct Dispatcher {
    destinations: Mutex<HashMap<String, Arc<Destination>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn destination(&self, key: &str) -> Arc<Destination> {
        let mut destinations = self.destinations.lock();
        destinations.entry(key.to_string()).or_insert_with(|| Arc::new(Destination::new())).clone()
    }

    pub fn destination_key(provider: &str, to: &str) -> String {
        format!("{provider}:{to}")
    }

    /// Drop destinations with nothing queued, bounding memory growth
    /// across long-lived gateways with many transient chats.
    pub fn prune_idle(&self) {
        self.destinations.lock().retain(|_, d| {
            let counts = d.queued_counts();
            counts.tool > 0 || counts.block > 0 || counts.final_pending > 0
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_returns_same_destination() {
        let dispatcher = Dispatcher::new();
        let a = dispatcher.destination("telegram:chat1");
        let b = dispatcher.destination("telegram:chat1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_keys_get_distinct_destinations() {
        let dispatcher = Dispatcher::new();
        let a = dispatcher.destination("telegram:chat1");
        let b = dispatcher.destination("telegram:chat2");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn destination_key_format() {
        assert_eq!(Dispatcher::destination_key("telegram", "chat1"), "telegram:chat1");
    }
}
