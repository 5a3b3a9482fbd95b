//! Cascading stop across a sub-agent tree.
//!
//! Unlike the teacher's `CancelMap`, which tracks parent→child membership
//! in an explicit `groups` side-table, sub-agent trees here have no
//! pointer graph — a child's session key is always a `:`-delimited
//! extension of its parent's (spec.md §5), so the tree is discovered by
//! asking the registry for direct descendants on demand. [`SubAgentTree`]
//! is the seam that lets `oc-orchestrator` supply that lookup without
//! this crate depending on the registry's storage.

/// A queryable view over a running session's descendant runs, keyed by
/// session key. Implemented by the sub-agent registry.
pub trait SubAgentTree {
    /// Direct children of `session_key` that currently have a run in
    /// flight. Does not need to recurse — [`cascade_stop`] walks the
    /// tree level by level.
    fn direct_children(&self, session_key: &str) -> Vec<String>;

    /// True if the run for `session_key` has already reached a terminal
    /// state (completed, errored, or previously stopped).
    fn is_ended(&self, session_key: &str) -> bool;

    /// Mark the run for `session_key` as stopped. Returns `true` if this
    /// call is what transitioned it from running to stopped (i.e. it was
    /// not already ended).
    fn mark_stopped(&self, session_key: &str) -> bool;
}

/// Stop `root_key`'s run and every descendant run beneath it.
///
/// Already-ended runs are not double-counted, but their children are
/// still visited — a parent finishing early must not orphan an
/// in-flight grandchild. Returns the number of runs newly transitioned
/// to stopped (the root included, if it was running).
pub fn cascade_stop(tree: &dyn SubAgentTree, root_key: &str) -> usize {
    let mut stopped = 0;
    let mut frontier = vec![root_key.to_string()];

    while let Some(key) = frontier.pop() {
        let children = tree.direct_children(&key);
        if !tree.is_ended(&key) && tree.mark_stopped(&key) {
            stopped += 1;
        }
        frontier.extend(children);
    }

    stopped
}
