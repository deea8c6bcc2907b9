//! Reactive Context
//!
//! The reactive context tracks which computation is currently running and
//! which nodes it has read so far. When a node is read with `get()`, the
//! read is recorded in the top frame; when the computation finishes, the
//! frame becomes the node's new source list.
//!
//! # Implementation
//!
//! Frames live on an explicit stack owned by the runtime. Evaluating one
//! node can trigger evaluation of another (a computed reading a stale
//! computed, a proxy resolving its slice), so every evaluation pushes its own
//! frame and pops it when done. Without that save/restore discipline reads
//! would be attributed to the wrong node.
//!
//! A frame whose observer is `None` is an untracked scope: reads inside it
//! record nothing.
//!
//! # Source reconciliation
//!
//! Re-executions usually read the same nodes in the same order. While the
//! reads match the previous source list index by index, the frame only
//! advances `matched`; nothing is allocated and no observer lists change.
//! From the first mismatch on, reads are collected into `gets`, which
//! replaces the old tail of the source list.

use super::runtime::{try_with_runtime, with_runtime, Runtime};
use crate::graph::node::EdgeList;
use crate::graph::NodeId;

/// Reads recorded for one running computation.
#[derive(Debug)]
pub(crate) struct Frame {
    /// The node being evaluated, or `None` for an untracked scope.
    pub(crate) observer: Option<NodeId>,

    /// Length of the prefix of the previous source list that was read again
    /// in the same order.
    pub(crate) matched: usize,

    /// Reads after the first mismatch, deduplicated.
    pub(crate) gets: EdgeList,
}

impl Frame {
    fn new(observer: Option<NodeId>) -> Self {
        Self {
            observer,
            matched: 0,
            gets: EdgeList::new(),
        }
    }

    /// Record a read of `source`, given the observer's previous sources.
    pub(crate) fn record(&mut self, source: NodeId, previous: &[NodeId]) {
        if self.gets.is_empty() && previous.get(self.matched) == Some(&source) {
            self.matched += 1;
            return;
        }
        if previous[..self.matched].contains(&source) || self.gets.contains(&source) {
            return;
        }
        self.gets.push(source);
    }
}

/// Stack of tracking frames.
pub(crate) struct Tracker {
    frames: Vec<Frame>,
}

impl Tracker {
    pub(crate) fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// The node reads should currently be attributed to.
    pub(crate) fn current_observer(&self) -> Option<NodeId> {
        self.frames.last().and_then(|frame| frame.observer)
    }

    /// The innermost node actually being evaluated, looking through
    /// untracked scopes.
    pub(crate) fn current_owner(&self) -> Option<NodeId> {
        self.frames.iter().rev().find_map(|frame| frame.observer)
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    fn push(&mut self, observer: Option<NodeId>) -> usize {
        self.frames.push(Frame::new(observer));
        self.frames.len()
    }

    fn pop(&mut self, observer: Option<NodeId>, depth: usize) -> Option<Frame> {
        debug_assert_eq!(
            self.frames.len(),
            depth,
            "tracking stack out of balance while leaving {observer:?}"
        );
        let frame = self.frames.pop();
        if let Some(frame) = &frame {
            debug_assert_eq!(
                frame.observer, observer,
                "tracking frame mismatch: expected {:?}, got {:?}",
                observer, frame.observer
            );
        }
        frame
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Guard for one pushed frame.
///
/// `finish` pops the frame and hands it back. If the computation unwinds
/// instead, dropping the guard pops and discards the frame so the stack
/// stays balanced.
pub(crate) struct TrackingScope {
    observer: Option<NodeId>,
    depth: usize,
    finished: bool,
}

impl TrackingScope {
    pub(crate) fn enter(rt: &mut Runtime, observer: Option<NodeId>) -> Self {
        let depth = rt.tracker.push(observer);
        Self {
            observer,
            depth,
            finished: false,
        }
    }

    pub(crate) fn finish(mut self, rt: &mut Runtime) -> Frame {
        self.finished = true;
        rt.tracker
            .pop(self.observer, self.depth)
            .unwrap_or_else(|| Frame::new(self.observer))
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        if !self.finished {
            let (observer, depth) = (self.observer, self.depth);
            try_with_runtime(|rt| rt.tracker.pop(observer, depth));
        }
    }
}

/// Run `f` without recording any reads.
///
/// Reads inside `f` return current values but do not make the running
/// computation depend on them.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let scope = with_runtime(|rt| TrackingScope::enter(rt, None));
    let result = f();
    with_runtime(|rt| scope.finish(rt));
    result
}

/// Whether reads are currently being recorded.
pub fn is_tracking() -> bool {
    with_runtime(|rt| rt.tracker.current_observer().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::signal;

    #[test]
    fn record_matches_previous_prefix() {
        let (a, b, c) = (signal(0).id(), signal(0).id(), signal(0).id());
        let previous = [a, b, c];

        let mut frame = Frame::new(None);
        frame.record(a, &previous);
        frame.record(b, &previous);
        assert_eq!(frame.matched, 2);
        assert!(frame.gets.is_empty());

        // Diverging from the old order switches to collecting.
        frame.record(a, &previous);
        frame.record(signal(0).id(), &previous);
        assert_eq!(frame.matched, 2);
        assert_eq!(frame.gets.len(), 1);
    }

    #[test]
    fn record_deduplicates_reads() {
        let (a, b) = (signal(0).id(), signal(0).id());
        let mut frame = Frame::new(None);

        frame.record(a, &[]);
        frame.record(b, &[]);
        frame.record(a, &[]);
        assert_eq!(frame.gets.as_slice(), &[a, b]);
    }

    #[test]
    fn nested_scopes_restore_outer_observer() {
        let outer = signal(0).id();
        let inner = signal(0).id();

        let outer_scope = with_runtime(|rt| TrackingScope::enter(rt, Some(outer)));
        assert!(is_tracking());
        {
            let inner_scope = with_runtime(|rt| TrackingScope::enter(rt, Some(inner)));
            assert_eq!(with_runtime(|rt| rt.tracker.current_observer()), Some(inner));
            with_runtime(|rt| inner_scope.finish(rt));
        }
        assert_eq!(with_runtime(|rt| rt.tracker.current_observer()), Some(outer));
        with_runtime(|rt| outer_scope.finish(rt));
        assert!(!is_tracking());
    }

    #[test]
    fn dropped_scope_pops_its_frame() {
        let depth = with_runtime(|rt| rt.tracker.depth());
        {
            let _scope = with_runtime(|rt| TrackingScope::enter(rt, None));
            assert_eq!(with_runtime(|rt| rt.tracker.depth()), depth + 1);
        }
        assert_eq!(with_runtime(|rt| rt.tracker.depth()), depth);
    }

    #[test]
    fn untrack_suspends_tracking() {
        let observer = signal(0).id();
        let scope = with_runtime(|rt| TrackingScope::enter(rt, Some(observer)));
        untrack(|| assert!(!is_tracking()));
        assert!(is_tracking());
        with_runtime(|rt| scope.finish(rt));
    }
}
