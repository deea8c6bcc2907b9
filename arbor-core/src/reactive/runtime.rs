//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds,
//! effects and store proxies. It owns the node arena, the tracking stack and
//! the effect queue for the current thread.
//!
//! # How It Works
//!
//! 1. Reading a node with `get` records it in the running computation's
//!    tracking frame, then resolves the node's staleness and returns its
//!    value. `read` does the same without recording.
//!
//! 2. Writing a node compares the new value with the old one. On a change
//!    every observer is marked `Dirty`, their transitive observers `Check`,
//!    and effects leaving `Fresh` are queued. The queue is then drained.
//!
//! 3. Resolving a `Check` node walks its sources in order, resolving each,
//!    and stops as soon as the node itself turns `Dirty`. If no source
//!    changed the node goes back to `Fresh` without recomputing.
//!
//! 4. Recomputing a `Dirty` node runs its function under a fresh tracking
//!    frame, reconciles the source list, and marks observers `Dirty` only if
//!    the value actually changed. A node reachable from one changed source
//!    through several paths therefore recomputes at most once, and not at
//!    all if an intermediate value came out unchanged.
//!
//! # Threading
//!
//! The runtime is thread-local and execution is fully synchronous. Handles
//! are plain ids and are only meaningful on the thread that created them.
//! User code never runs while the runtime is borrowed: values are cloned out
//! and closures are called between borrows.

use std::any::type_name;
use std::cell::RefCell;
use std::mem;

use smallvec::SmallVec;

use super::context::{Frame, Tracker, TrackingScope};
use crate::config::RuntimeConfig;
use crate::error::{ReactiveError, Result};
use crate::graph::node::{AnyValue, Cleanup, EdgeList, Node, NodeKind, NodeState};
use crate::graph::scheduler::{run_effects, EffectQueue};
use crate::graph::{Arena, NodeId};

thread_local! {
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::new());
}

/// Per-thread reactive state.
pub(crate) struct Runtime {
    pub(crate) nodes: Arena<Node>,
    pub(crate) tracker: Tracker,
    pub(crate) queue: EffectQueue,
    pub(crate) config: RuntimeConfig,
}

/// Borrow the current thread's runtime.
///
/// Must not be nested, and `f` must not call back into user code.
pub(crate) fn with_runtime<R>(f: impl FnOnce(&mut Runtime) -> R) -> R {
    RUNTIME.with(|rt| f(&mut rt.borrow_mut()))
}

/// Like [`with_runtime`], but gives up instead of panicking when the runtime
/// is already borrowed or being torn down. Used from drop guards.
pub(crate) fn try_with_runtime<R>(f: impl FnOnce(&mut Runtime) -> R) -> Option<R> {
    RUNTIME
        .try_with(|rt| rt.try_borrow_mut().ok().map(|mut rt| f(&mut rt)))
        .ok()
        .flatten()
}

impl Runtime {
    fn new() -> Self {
        Self {
            nodes: Arena::new(),
            tracker: Tracker::new(),
            queue: EffectQueue::new(),
            config: RuntimeConfig::default(),
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id).ok_or(ReactiveError::Disposed(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id).ok_or(ReactiveError::Disposed(id))
    }

    /// Record a read of `source` by the running computation, if any.
    fn track(&mut self, source: NodeId) {
        let Some(observer) = self.tracker.current_observer() else {
            return;
        };
        if observer == source {
            return;
        }
        let previous = self
            .nodes
            .get(observer)
            .map(|node| node.sources.as_slice())
            .unwrap_or(&[]);
        if let Some(frame) = self.tracker.top_mut() {
            frame.record(source, previous);
        }
    }

    /// Raise `id` to `state` and its transitive observers to `Check`.
    ///
    /// Every effect reached is queued unless it is already queued or is the
    /// one currently running. An effect left `Dirty` by a panic is therefore
    /// picked up again by the next write. Nodes already at or above the
    /// requested state are not walked through, which bounds the walk.
    pub(crate) fn mark_stale(&mut self, id: NodeId, state: NodeState) {
        let mut stack: SmallVec<[(NodeId, NodeState); 16]> = SmallVec::new();
        stack.push((id, state));

        while let Some((id, state)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            if node.is_effect() && !node.queued && !node.evaluating {
                node.queued = true;
                self.queue.push(id);
            }
            if node.state >= state {
                continue;
            }
            tracing::trace!(node = %id, ?state, "marked stale");
            node.state = state;
            stack.extend(node.observers.iter().map(|&o| (o, NodeState::Check)));
        }
    }

    /// Mark every observer of `id` as `Dirty`.
    fn invalidate_observers(&mut self, id: NodeId) {
        let observers = match self.nodes.get(id) {
            Some(node) => node.observers.clone(),
            None => return,
        };
        for observer in observers {
            self.mark_stale(observer, NodeState::Dirty);
        }
    }

    /// Replace the tail of `id`'s source list with what `frame` recorded,
    /// keeping both ends of every edge in step.
    fn reconcile_sources(&mut self, id: NodeId, mut frame: Frame) {
        frame.gets.retain(|source| self.nodes.contains(*source));

        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let matched = frame.matched.min(node.sources.len());
        let dropped: EdgeList = node.sources.drain(matched..).collect();
        node.sources.extend(frame.gets.iter().copied());

        for source in dropped {
            if let Some(source) = self.nodes.get_mut(source) {
                source.remove_observer(id);
            }
        }
        for &source in &frame.gets {
            if let Some(source) = self.nodes.get_mut(source) {
                source.add_observer(id);
            }
        }
    }

    /// Remove every source edge of `id`.
    fn unlink_sources(&mut self, id: NodeId) {
        let sources = match self.nodes.get_mut(id) {
            Some(node) => mem::take(&mut node.sources),
            None => return,
        };
        for source in sources {
            if let Some(source) = self.nodes.get_mut(source) {
                source.remove_observer(id);
            }
        }
    }

    /// Take `id` out of the arena, removing it from both ends of every edge.
    fn detach(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(id)?;
        for &source in &node.sources {
            if let Some(source) = self.nodes.get_mut(source) {
                source.remove_observer(id);
            }
        }
        for &observer in &node.observers {
            if let Some(observer) = self.nodes.get_mut(observer) {
                observer.sources.retain(|source| *source != id);
            }
        }
        Some(node)
    }

    /// Check the source/observer symmetry invariant over the whole arena.
    #[cfg(test)]
    pub(crate) fn assert_symmetric(&self, ids: &[NodeId]) {
        for &id in ids {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            for &source in &node.sources {
                let source_node = self.nodes.get(source).expect("dangling source");
                assert!(source_node.observers.contains(&id), "{source} is missing observer {id}");
            }
            for &observer in &node.observers {
                let observer_node = self.nodes.get(observer).expect("dangling observer");
                assert!(observer_node.sources.contains(&id), "{observer} is missing source {id}");
            }
            let mut unique = node.observers.to_vec();
            unique.sort_by_key(|o| (o.index(), o.generation()));
            unique.dedup();
            assert_eq!(unique.len(), node.observers.len(), "duplicate observers on {id}");
        }
    }
}

/// Insert a node into the current runtime.
pub(crate) fn create(node: Node) -> NodeId {
    with_runtime(|rt| {
        let kind = node.kind;
        let id = rt.nodes.insert(node);
        tracing::trace!(node = %id, ?kind, "node created");
        id
    })
}

/// Tracked read: record the dependency, then return the current value.
pub(crate) fn get<T: Clone + 'static>(id: NodeId) -> Result<T> {
    with_runtime(|rt| {
        rt.node(id)?;
        rt.track(id);
        Ok::<_, ReactiveError>(())
    })?;
    read(id)
}

/// Untracked read: resolve staleness and clone the value out.
pub(crate) fn read<T: Clone + 'static>(id: NodeId) -> Result<T> {
    update_if_necessary(id)?;
    with_runtime(|rt| {
        let node = rt.node(id)?;
        let value = node
            .value
            .as_ref()
            .and_then(|value| value.downcast_ref::<T>())
            .unwrap_or_else(|| panic!("node {id} holds no value of type {}", type_name::<T>()));
        Ok(value.clone())
    })
}

/// Bring `id` up to date, recomputing only what is actually stale.
pub(crate) fn update_if_necessary(id: NodeId) -> Result<()> {
    let (state, sources) = with_runtime(|rt| {
        let node = rt.node(id)?;
        if node.evaluating {
            return Err(ReactiveError::Cycle(id));
        }
        let sources = if node.state == NodeState::Check {
            node.sources.clone()
        } else {
            EdgeList::new()
        };
        Ok((node.state, sources))
    })?;

    if state == NodeState::Fresh {
        return Ok(());
    }

    if state == NodeState::Check {
        for source in sources {
            match update_if_necessary(source) {
                Ok(()) | Err(ReactiveError::Disposed(_)) => {}
                Err(err) => return Err(err),
            }
            // A source recomputed to a new value; no need to look further.
            if state_of(id)? == NodeState::Dirty {
                break;
            }
        }
    }

    match state_of(id)? {
        NodeState::Dirty => update(id),
        NodeState::Check => with_runtime(|rt| {
            rt.node_mut(id)?.state = NodeState::Fresh;
            Ok(())
        }),
        NodeState::Fresh => Ok(()),
    }
}

pub(crate) fn state_of(id: NodeId) -> Result<NodeState> {
    with_runtime(|rt| rt.node(id).map(|node| node.state))
}

/// Clears the evaluating flag if the node's function unwinds.
struct EvaluatingGuard(NodeId);

impl Drop for EvaluatingGuard {
    fn drop(&mut self) {
        let id = self.0;
        try_with_runtime(|rt| {
            if let Some(node) = rt.nodes.get_mut(id) {
                node.evaluating = false;
            }
        });
    }
}

/// Recompute `id`.
///
/// Cleanups from the previous run are invoked first. If the function
/// panics, the node stays `Dirty` and keeps its old sources, so the next
/// read retries.
fn update(id: NodeId) -> Result<()> {
    let (compute, cleanups) = with_runtime(|rt| {
        let node = rt.node_mut(id)?;
        Ok::<_, ReactiveError>((node.compute.clone(), mem::take(&mut node.cleanups)))
    })?;
    run_cleanups(cleanups);

    let Some(compute) = compute else {
        return with_runtime(|rt| {
            rt.node_mut(id)?.state = NodeState::Fresh;
            Ok(())
        });
    };

    let scope = with_runtime(|rt| {
        rt.node_mut(id)?.evaluating = true;
        Ok::<_, ReactiveError>(TrackingScope::enter(rt, Some(id)))
    })?;
    let guard = EvaluatingGuard(id);
    let value = compute();

    let stale_value = with_runtime(|rt| {
        let frame = scope.finish(rt);
        rt.reconcile_sources(id, frame);

        // The function may have disposed its own node.
        let node = rt.nodes.get_mut(id)?;
        node.evaluating = false;
        node.runs += 1;
        node.state = NodeState::Fresh;
        let changed = node.differs_from(value.as_ref());
        let previous = mem::replace(&mut node.value, Some(value));
        tracing::trace!(node = %id, changed, "recomputed");

        if changed {
            rt.invalidate_observers(id);
        }
        previous
    });
    mem::forget(guard);

    // Old values are dropped outside the runtime borrow.
    drop(stale_value);
    Ok(())
}

/// Store a new value on `id` and flush effects.
///
/// Writing a computed demotes it to a plain signal: its function is dropped
/// and its sources unlinked.
pub(crate) fn write(id: NodeId, value: AnyValue) -> Result<()> {
    let previous = with_runtime(|rt| {
        let node = rt.node_mut(id)?;
        if node.compute.is_some() && node.kind == NodeKind::Computed {
            tracing::trace!(node = %id, "computed demoted to signal");
            node.compute = None;
            node.kind = NodeKind::Signal;
            node.state = NodeState::Fresh;
            rt.unlink_sources(id);
        }

        let node = rt.node_mut(id)?;
        if !node.differs_from(value.as_ref()) {
            return Ok::<_, ReactiveError>(None);
        }
        rt.invalidate_observers(id);
        let node = rt.node_mut(id)?;
        Ok(Some(mem::replace(&mut node.value, Some(value))))
    })?;
    drop(previous);

    run_effects();
    Ok(())
}

/// Dispose `id`: unlink it from the graph, free its slot and run its
/// cleanups. Store children and owned nodes are disposed along with it.
pub(crate) fn dispose(id: NodeId) {
    let removed = with_runtime(|rt| {
        crate::store::detach_from_parent(rt, id);

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = rt.detach(id) {
                if let Some(links) = &node.proxy {
                    stack.extend(links.child_ids());
                }
                stack.extend(node.owned.iter().copied());
                tracing::trace!(node = %id, "disposed");
                removed.push(node);
            }
        }
        removed
    });

    for mut node in removed {
        run_cleanups(mem::take(&mut node.cleanups));
    }
}

/// Tie `child`'s lifetime to `owner`: disposing the owner disposes the child.
pub(crate) fn adopt(owner: NodeId, child: NodeId) -> Result<()> {
    with_runtime(|rt| {
        rt.node(child)?;
        rt.node_mut(owner)?.owned.push(child);
        Ok::<_, ReactiveError>(())
    })
}

fn run_cleanups(cleanups: SmallVec<[Cleanup; 1]>) {
    if cleanups.is_empty() {
        return;
    }
    super::context::untrack(|| {
        for cleanup in cleanups {
            cleanup();
        }
    });
}

/// Register a teardown callback on the currently running computation.
///
/// The callback runs before the computation's next run and when it is
/// disposed. Called outside any running computation it logs a warning and
/// does nothing.
pub fn on_cleanup(f: impl FnOnce() + 'static) {
    let cleanup: Cleanup = Box::new(f);
    let rejected = with_runtime(|rt| match rt.tracker.current_owner() {
        Some(owner) => match rt.nodes.get_mut(owner) {
            Some(node) => {
                node.cleanups.push(cleanup);
                None
            }
            None => Some(cleanup),
        },
        None => Some(cleanup),
    });

    if rejected.is_some() {
        tracing::warn!("on_cleanup called outside of a running computation; ignored");
    }
}

/// Number of live nodes on the current thread.
pub fn node_count() -> usize {
    with_runtime(|rt| rt.nodes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{computed, effect, signal};
    use std::cell::Cell;
    use std::rc::Rc;

    fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let count = Rc::new(Cell::new(0));
        (count.clone(), count)
    }

    #[test]
    fn stale_propagation_marks_dirty_then_check() {
        let a = signal(1);
        let b = computed(move || a.get() + 1);
        let c = computed(move || b.get() + 1);
        assert_eq!(c.get(), 3);

        with_runtime(|rt| rt.mark_stale(b.id(), NodeState::Dirty));
        assert_eq!(state_of(b.id()).unwrap(), NodeState::Dirty);
        assert_eq!(state_of(c.id()).unwrap(), NodeState::Check);

        // Nothing actually changed, so c resolves without recomputing.
        assert_eq!(c.get(), 3);
        assert_eq!(state_of(c.id()).unwrap(), NodeState::Fresh);
    }

    #[test]
    fn check_resolves_without_recompute_when_source_unchanged() {
        let a = signal(3);
        let (parity_runs, parity_seen) = counter();
        let parity = computed(move || {
            parity_runs.set(parity_runs.get() + 1);
            a.get() % 2
        });
        let (label_runs, label_seen) = counter();
        let label = computed(move || {
            label_runs.set(label_runs.get() + 1);
            if parity.get() == 0 { "even" } else { "odd" }
        });

        assert_eq!(label.get(), "odd");
        a.set(5);
        assert_eq!(label.get(), "odd");
        assert_eq!(parity_seen.get(), 2);
        assert_eq!(label_seen.get(), 1);
    }

    #[test]
    fn dynamic_dependencies_are_reconciled() {
        let flag = signal(true);
        let left = signal(1);
        let right = signal(2);
        let pick = computed(move || if flag.get() { left.get() } else { right.get() });

        assert_eq!(pick.get(), 1);
        assert_eq!(left.observer_count(), 1);
        assert_eq!(right.observer_count(), 0);

        flag.set(false);
        assert_eq!(pick.get(), 2);
        assert_eq!(left.observer_count(), 0);
        assert_eq!(right.observer_count(), 1);
        assert_eq!(pick.source_count(), 2);

        with_runtime(|rt| {
            rt.assert_symmetric(&[flag.id(), left.id(), right.id(), pick.id()])
        });
    }

    #[test]
    fn repeated_reads_register_one_edge() {
        let a = signal(2);
        let sum = computed(move || a.get() + a.get() + a.get());
        assert_eq!(sum.get(), 6);
        assert_eq!(sum.source_count(), 1);
        assert_eq!(a.observer_count(), 1);
    }

    #[test]
    fn writing_a_computed_demotes_it() {
        let a = signal(1);
        let doubled = computed(move || a.get() * 2);
        assert_eq!(doubled.get(), 2);

        doubled.set(100);
        assert_eq!(doubled.get(), 100);
        assert_eq!(a.observer_count(), 0);

        a.set(7);
        assert_eq!(doubled.get(), 100);
    }

    #[test]
    fn panicking_computation_is_retried() {
        let fail = signal(true);
        let value = computed(move || {
            if fail.get() {
                panic!("boom");
            }
            42
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| value.get()));
        assert!(result.is_err());
        assert_eq!(state_of(value.id()).unwrap(), NodeState::Dirty);
        assert_eq!(with_runtime(|rt| rt.tracker.depth()), 0);

        fail.set(false);
        assert_eq!(value.get(), 42);
    }

    #[test]
    fn self_read_is_a_cycle() {
        let slot: Rc<Cell<Option<NodeId>>> = Rc::new(Cell::new(None));
        let slot_in = slot.clone();
        let node = computed(move || match slot_in.get() {
            Some(id) => matches!(get::<bool>(id), Err(ReactiveError::Cycle(_))),
            None => false,
        });
        slot.set(Some(node.id()));
        assert!(node.get());
    }

    #[test]
    fn dispose_unlinks_both_directions() {
        let a = signal(1);
        let b = computed(move || a.get() + 1);
        let (runs, seen) = counter();
        let e = effect(move || {
            b.get();
            runs.set(runs.get() + 1);
        });
        assert_eq!(a.observer_count(), 1);

        b.dispose();
        assert_eq!(a.observer_count(), 0);
        assert_eq!(e.source_count(), 0);
        assert!(matches!(b.try_get(), Err(ReactiveError::Disposed(_))));

        a.set(2);
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn cleanup_outside_computation_is_ignored() {
        let (called, seen) = counter();
        on_cleanup(move || called.set(1));
        assert_eq!(seen.get(), 0);
    }
}
