//! Inbound-message dedupe (spec.md §4.7 step 1).
//!
//! Keyed by `(provider|originatingChannel, to, messageSid)`, bounded by
//! insertion-order LRU eviction — the same drop-oldest shape as
//! [`oc_abort::AbortMemory`], since both guard an unbounded-growth risk
//! with a hand-rolled cap rather than a dedicated LRU crate.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

struct Inner {
    order: VecDeque<String>,
    seen: HashMap<String, ()>,
    cap: usize,
}

pub struct DedupeStore {
    inner: Mutex<Inner>,
}

impl DedupeStore {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                order: VecDeque::new(),
                seen: HashMap::new(),
                cap: cap.max(1),
            }),
        }
    }

    pub fn dedupe_key(channel_identity: &str, to: &str, message_sid: &str) -> String {
        format!("{channel_identity}|{to}|{message_sid}")
    }

    /// Returns `true` if this key was already seen (a duplicate that
    /// should be dropped before reaching the agent runner).
    pub fn check_and_insert(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.seen.contains_key(key) {
            return true;
        }
        inner.seen.insert(key.to_string(), ());
        inner.order.push_back(key.to_string());
        if inner.order.len() > inner.cap {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        false
    }
}
