//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! sources change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    its initial sources.
//!
//! 2. When stale propagation first moves the effect away from `Fresh`, it is
//!    queued. The queue is drained before the triggering write returns.
//!
//! 3. Draining resolves the effect's staleness. The function only re-runs if
//!    a source actually changed value, and it runs at most once per flush
//!    for any number of source changes.
//!
//! # Cleanup
//!
//! [`on_cleanup`](super::on_cleanup) called from inside the function
//! registers a teardown callback. Callbacks from one run are invoked before
//! the next run and when the effect is disposed.
//!
//! # Lifetime
//!
//! `Effect` is a `Copy` handle. Dropping it does not stop the effect; call
//! [`Effect::dispose`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::computed::Computed;
use super::context::untrack;
use super::{or_panic, runtime};
use crate::graph::node::{AnyValue, Node};
use crate::graph::NodeId;

/// A side-effecting computation that runs when its sources change.
///
/// # Example
///
/// ```rust
/// use arbor_core::{effect, signal};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let count = signal(0);
/// let seen = Rc::new(Cell::new(-1));
/// let seen_in = seen.clone();
/// let _effect = effect(move || seen_in.set(count.get()));
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    id: NodeId,
}

impl Effect {
    /// Create a new effect and run it once.
    ///
    /// # Panics
    ///
    /// Propagates a panic raised by the first run.
    pub fn new(run: impl Fn() + 'static) -> Self {
        let compute = Rc::new(move || {
            run();
            Box::new(()) as AnyValue
        });
        let id = runtime::create(Node::effect(compute));
        or_panic(runtime::update_if_necessary(id));
        Self { id }
    }

    /// Get the effect's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Number of times the function has completed.
    pub fn run_count(&self) -> usize {
        runtime::with_runtime(|rt| rt.node(self.id).map_or(0, |node| node.runs))
    }

    /// Number of nodes read during the last run.
    pub fn source_count(&self) -> usize {
        runtime::with_runtime(|rt| rt.node(self.id).map_or(0, |node| node.sources.len()))
    }

    /// Stop the effect and run its pending cleanups.
    pub fn dispose(&self) {
        runtime::dispose(self.id);
    }

    /// Whether the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        runtime::with_runtime(|rt| rt.node(self.id).is_err())
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("source_count", &self.source_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create an effect.
pub fn effect(run: impl Fn() + 'static) -> Effect {
    Effect::new(run)
}

/// Watch a derived value and call `callback(new, old)` whenever it changes.
///
/// `source` is tracked; `callback` runs untracked, so reads inside it do
/// not subscribe the watcher. The callback is not invoked for the initial
/// value. Disposing the returned effect also disposes the derived value.
pub fn watch<T, S, C>(source: S, callback: C) -> Effect
where
    T: Clone + PartialEq + 'static,
    S: Fn() -> T + 'static,
    C: Fn(&T, &T) + 'static,
{
    let derived = Computed::new(source);
    let previous: RefCell<Option<T>> = RefCell::new(None);

    let effect = Effect::new(move || {
        let next = derived.get();
        let old = previous.replace(Some(next.clone()));
        if let Some(old) = old {
            untrack(|| callback(&next, &old));
        }
    });
    or_panic(runtime::adopt(effect.id, derived.id()));
    effect
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{computed, on_cleanup, signal};
    use std::cell::Cell;

    fn counter() -> Rc<Cell<usize>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn effect_runs_on_creation() {
        let run_count = counter();
        let run_count_clone = run_count.clone();

        let effect = effect(move || run_count_clone.set(run_count_clone.get() + 1));

        assert_eq!(run_count.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_source_changes() {
        let source = signal(0);
        let seen = Rc::new(Cell::new(-1));
        let seen_in = seen.clone();
        let effect = effect(move || seen_in.set(source.get()));

        source.set(1);
        assert_eq!(seen.get(), 1);
        source.set(2);
        assert_eq!(seen.get(), 2);
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn effect_skips_run_when_computed_unchanged() {
        let source = signal(2);
        let even = computed(move || source.get() % 2 == 0);
        let effect = effect(move || {
            even.get();
        });

        source.set(4);
        source.set(6);
        assert_eq!(effect.run_count(), 1);

        source.set(7);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let source = signal(0);
        let effect = effect(move || {
            source.get();
        });

        effect.dispose();
        assert!(effect.is_disposed());

        source.set(1);
        assert_eq!(source.observer_count(), 0);
    }

    #[test]
    fn cleanups_run_before_rerun_and_on_dispose() {
        let source = signal(0);
        let cleaned = counter();
        let cleaned_in = cleaned.clone();
        let effect = effect(move || {
            source.get();
            let cleaned = cleaned_in.clone();
            on_cleanup(move || cleaned.set(cleaned.get() + 1));
        });
        assert_eq!(cleaned.get(), 0);

        source.set(1);
        assert_eq!(cleaned.get(), 1);

        effect.dispose();
        assert_eq!(cleaned.get(), 2);
    }

    #[test]
    fn nested_write_coalesces_into_running_flush() {
        let input = signal(0);
        let mirrored = signal(0);
        let mirror_runs = counter();
        let mirror_runs_in = mirror_runs.clone();

        let _forward = effect(move || mirrored.set(input.get() * 10));
        let _mirror = effect(move || {
            mirrored.get();
            mirror_runs_in.set(mirror_runs_in.get() + 1);
        });
        assert_eq!(mirror_runs.get(), 1);

        input.set(1);
        assert_eq!(mirrored.read(), 10);
        assert_eq!(mirror_runs.get(), 2);
    }

    #[test]
    fn watch_reports_new_and_old() {
        let source = signal(1);
        let changes = Rc::new(RefCell::new(Vec::new()));
        let changes_in = changes.clone();

        let _watcher = watch(
            move || source.get() * 2,
            move |new, old| changes_in.borrow_mut().push((*new, *old)),
        );
        assert!(changes.borrow().is_empty());

        source.set(2);
        source.set(3);
        assert_eq!(*changes.borrow(), vec![(4, 2), (6, 4)]);
    }

    #[test]
    fn effect_runs_again_after_panicking() {
        let source = signal(0);
        let runs = counter();
        let runs_in = runs.clone();
        let _effect = effect(move || {
            runs_in.set(runs_in.get() + 1);
            if source.get() == 1 {
                panic!("rejected value");
            }
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| source.set(1)));
        assert!(result.is_err());
        assert_eq!(runs.get(), 2);

        source.set(2);
        assert_eq!(runs.get(), 3);
        source.set(3);
        assert_eq!(runs.get(), 4);
    }

    #[test]
    fn disposing_watch_frees_derived_value() {
        let source = signal(0);
        let before = crate::reactive::node_count();

        let watcher = watch(move || source.get(), |_, _| {});
        assert_eq!(source.observer_count(), 1);

        watcher.dispose();
        assert_eq!(crate::reactive::node_count(), before);
        assert_eq!(source.observer_count(), 0);
    }

    #[test]
    fn untracked_read_does_not_subscribe() {
        let tracked = signal(0);
        let ignored = signal(0);
        let effect = effect(move || {
            tracked.get();
            ignored.read();
        });

        ignored.set(1);
        assert_eq!(effect.run_count(), 1);
        tracked.set(1);
        assert_eq!(effect.run_count(), 2);
    }
}
