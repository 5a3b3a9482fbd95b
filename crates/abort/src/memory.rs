//! LRU-capped record of recently-aborted session keys.
//!
//! Insertion order is tracked in a side [`VecDeque`] so the oldest entry
//! can be dropped in O(1) amortized when the cap is exceeded, mirroring
//! the hand-rolled dedupe caches elsewhere in this codebase rather than
//! pulling in a dedicated LRU crate for one small map.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

struct Inner {
    order: VecDeque<String>,
    aborted_at: HashMap<String, DateTime<Utc>>,
    cap: usize,
}

pub struct AbortMemory {
    inner: Mutex<Inner>,
}

impl AbortMemory {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                order: VecDeque::new(),
                aborted_at: HashMap::new(),
                cap: cap.max(1),
            }),
        }
    }

    /// Mark `session_key` aborted at `now`, evicting the oldest entry if
    /// the cap would otherwise be exceeded. Re-marking an existing key
    /// refreshes its timestamp without reordering it for eviction
    /// purposes — insertion order, not last-touch order, drives eviction.
    pub fn mark_aborted(&self, session_key: &str, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        if inner.aborted_at.insert(session_key.to_string(), now).is_none() {
            inner.order.push_back(session_key.to_string());
            if inner.order.len() > inner.cap {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.aborted_at.remove(&oldest);
                }
            }
        }
    }

    pub fn is_aborted(&self, session_key: &str) -> bool {
        self.inner.lock().aborted_at.contains_key(session_key)
    }

    pub fn aborted_at(&self, session_key: &str) -> Option<DateTime<Utc>> {
        self.inner.lock().aborted_at.get(session_key).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().aborted_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_and_queries() {
        let mem = AbortMemory::new(10);
        assert!(!mem.is_aborted("s1"));
        mem.mark_aborted("s1", Utc::now());
        assert!(mem.is_aborted("s1"));
    }

    #[test]
    fn evicts_oldest_beyond_cap() {
        let mem = AbortMemory::new(2000);
        for i in 0..2001 {
            mem.mark_aborted(&format!("s{i}"), Utc::now());
        }
        assert_eq!(mem.len(), 2000);
        assert!(!mem.is_aborted("s0"));
        assert!(mem.is_aborted("s1"));
        assert!(mem.is_aborted("s2000"));
    }

    #[test]
    fn remarking_does_not_duplicate_or_reorder_eviction() {
        let mem = AbortMemory::new(3);
        mem.mark_aborted("a", Utc::now());
        mem.mark_aborted("b", Utc::now());
        mem.mark_aborted("a", Utc::now()); // re-mark, still counts as inserted at position 0
        mem.mark_aborted("c", Utc::now());
        mem.mark_aborted("d", Utc::now()); // pushes out "a", the original oldest insertion

        assert!(!mem.is_aborted("a"));
        assert!(mem.is_aborted("b"));
        assert!(mem.is_aborted("c"));
        assert!(mem.is_aborted("d"));
    }
}
