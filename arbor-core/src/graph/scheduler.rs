//! Effect Scheduler
//!
//! Effects are eager: when stale propagation first moves an effect away from
//! `Fresh`, the effect is appended to the runtime's queue. The queue is then
//! drained synchronously before the triggering write returns.
//!
//! # Algorithm
//!
//! 1. A write marks nodes stale; effects leaving `Fresh` are queued in
//!    insertion order.
//! 2. The outermost writer drains the queue. For each effect we resolve
//!    staleness (`update_if_necessary`), which only re-executes the effect
//!    body if one of its sources actually produced a different value.
//! 3. An effect may write signals while running. Those writes append to the
//!    same queue instead of starting a nested flush, and the drain loop runs
//!    until it observes the queue empty.
//!
//! Effects that keep writing to their own sources never converge. That is
//! not prevented; a warning is logged once a flush passes
//! `RuntimeConfig::flush_warn_threshold` effect runs.

use std::collections::VecDeque;

use super::NodeId;
use crate::error::ReactiveError;
use crate::reactive::{runtime, try_with_runtime, with_runtime};

/// Pending effects plus the flush/batch bookkeeping.
pub(crate) struct EffectQueue {
    pending: VecDeque<NodeId>,
    flushing: bool,
    batch_depth: usize,
}

impl EffectQueue {
    pub(crate) fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            flushing: false,
            batch_depth: 0,
        }
    }

    pub(crate) fn push(&mut self, effect: NodeId) {
        self.pending.push_back(effect);
    }

    fn pop(&mut self) -> Option<NodeId> {
        self.pending.pop_front()
    }

    /// Number of effects waiting to run.
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// A new flush may start only when none is running and no batch is open.
    fn can_flush(&self) -> bool {
        !self.flushing && self.batch_depth == 0
    }
}

/// Resets the flushing flag, including when an effect panics mid-flush.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        try_with_runtime(|rt| rt.queue.flushing = false);
    }
}

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        try_with_runtime(|rt| rt.queue.batch_depth -= 1);
    }
}

/// Drain the effect queue.
///
/// Returns immediately when called from inside a running flush or an open
/// batch; the outer drain picks the new entries up. If an effect panics the
/// panic propagates and the effects still queued behind it stay queued for
/// the next flush. Any error other than disposal is raised as a panic.
pub(crate) fn run_effects() {
    let (started, threshold) = with_runtime(|rt| {
        if !rt.queue.can_flush() || rt.queue.len() == 0 {
            return (false, 0);
        }
        rt.queue.flushing = true;
        (true, rt.config.flush_warn_threshold)
    });
    if !started {
        return;
    }
    let _guard = FlushGuard;

    let mut processed = 0_usize;
    while let Some(effect) = with_runtime(|rt| {
        let effect = rt.queue.pop()?;
        if let Some(node) = rt.nodes.get_mut(effect) {
            node.queued = false;
        }
        Some(effect)
    }) {
        match runtime::update_if_necessary(effect) {
            Ok(()) => {}
            // Effects disposed after being queued are skipped.
            Err(ReactiveError::Disposed(_)) => continue,
            Err(err) => panic!("effect {effect} failed: {err}"),
        }
        processed += 1;
        if processed == threshold {
            tracing::warn!(
                processed,
                "effect flush has not converged; an effect may be writing to its own sources"
            );
        }
    }
    tracing::debug!(processed, "effect flush complete");
}

/// Run `f` with effect flushing deferred until the outermost batch returns.
///
/// Writes inside the batch still propagate staleness immediately, so
/// computeds read inside the batch are up to date; only effects wait.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    with_runtime(|rt| rt.queue.batch_depth += 1);
    let guard = BatchGuard;
    let result = f();
    drop(guard);
    run_effects();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, signal};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn queue_preserves_insertion_order() {
        let mut queue = EffectQueue::new();
        let a = signal(0).id();
        let b = signal(0).id();

        queue.push(a);
        queue.push(b);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(a));
        assert_eq!(queue.pop(), Some(b));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn batch_defers_effects_until_end() {
        let a = signal(1);
        let b = signal(2);
        let runs = Rc::new(Cell::new(0));
        let seen = Rc::new(Cell::new(0));

        let (runs_in, seen_in) = (runs.clone(), seen.clone());
        let _effect = effect(move || {
            runs_in.set(runs_in.get() + 1);
            seen_in.set(a.get() + b.get());
        });
        assert_eq!(runs.get(), 1);

        batch(|| {
            a.set(10);
            b.set(20);
            assert_eq!(runs.get(), 1);
        });

        assert_eq!(runs.get(), 2);
        assert_eq!(seen.get(), 30);
    }

    #[test]
    fn nested_batches_flush_once() {
        let a = signal(0);
        let runs = Rc::new(Cell::new(0));
        let runs_in = runs.clone();
        let _effect = effect(move || {
            a.get();
            runs_in.set(runs_in.get() + 1);
        });

        batch(|| {
            a.set(1);
            batch(|| a.set(2));
            assert_eq!(runs.get(), 1);
            a.set(3);
        });
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn flush_skips_disposed_effects() {
        let a = signal(0);
        let e = effect(move || {
            a.get();
        });
        e.dispose();

        with_runtime(|rt| rt.queue.push(e.id()));
        run_effects();
        assert_eq!(with_runtime(|rt| rt.queue.len()), 0);
    }

    #[test]
    fn flush_raises_errors_other_than_disposal() {
        let a = signal(0);
        let e = effect(move || {
            a.get();
        });

        // An effect found mid-evaluation by the flush is a cycle.
        with_runtime(|rt| {
            let node = rt.node_mut(e.id()).unwrap();
            node.state = crate::graph::NodeState::Dirty;
            node.evaluating = true;
            rt.queue.push(e.id());
        });
        let result = std::panic::catch_unwind(run_effects);
        assert!(result.is_err());

        with_runtime(|rt| rt.node_mut(e.id()).unwrap().evaluating = false);
        a.set(1);
        assert_eq!(e.run_count(), 2);
    }

    #[test]
    fn batch_returns_closure_result() {
        assert_eq!(batch(|| 7), 7);
    }
}
