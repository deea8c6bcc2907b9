//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! sources change.
//!
//! # How Computeds Work
//!
//! 1. Creation runs nothing. The first read evaluates the function and
//!    records which nodes it read.
//!
//! 2. While `Fresh`, reads return the cached value.
//!
//! 3. When a direct source changes the computed becomes `Dirty`; when
//!    something further up changes it becomes `Check`.
//!
//! 4. On the next read a `Check` computed asks its sources, in order, to
//!    bring themselves up to date. Only if one of them produced a different
//!    value does the computed re-run. If the re-run yields a value equal to
//!    the previous one, its own observers are left alone.
//!
//! # Why This Matters
//!
//! - Computeds that are never read never run.
//! - A computed reachable through several paths from one changed signal runs
//!   once, not once per path.
//! - An unchanged intermediate result stops propagation at that point.

use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::rc::Rc;

use super::{or_panic, runtime};
use crate::error::Result;
use crate::graph::node::{equals_by_eq, equals_with, AnyValue, EqualsFn, Node};
use crate::graph::{NodeId, NodeState};

/// A cached derived value that recomputes only when its sources change.
///
/// # Example
///
/// ```rust
/// use arbor_core::{computed, signal};
///
/// let count = signal(2);
/// let doubled = computed(move || count.get() * 2);
/// assert_eq!(doubled.get(), 4);
///
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T> {
    id: NodeId,
    marker: PhantomData<fn() -> T>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a new computed compared with `PartialEq`.
    ///
    /// The function is not run until the first read.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::from_parts(compute, equals_by_eq::<T>())
    }

    /// Create a new computed with a custom equality.
    pub fn with_equals(
        compute: impl Fn() -> T + 'static,
        equals: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        Self::from_parts(compute, equals_with(equals))
    }

    fn from_parts(compute: impl Fn() -> T + 'static, equals: EqualsFn) -> Self {
        let compute = Rc::new(move || Box::new(compute()) as AnyValue);
        let id = runtime::create(Node::computed(compute, equals));
        Self {
            id,
            marker: PhantomData,
        }
    }

    /// Get the computed's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value, recomputing if necessary and recording a
    /// dependency if a computation is running.
    ///
    /// # Panics
    ///
    /// Panics if the computed has been disposed or reads itself.
    pub fn get(&self) -> T {
        or_panic(self.try_get())
    }

    /// Like [`Computed::get`], but reports misuse as an error.
    pub fn try_get(&self) -> Result<T> {
        runtime::get(self.id)
    }

    /// Get the current value without recording a dependency.
    pub fn read(&self) -> T {
        or_panic(runtime::read(self.id))
    }

    /// Overwrite the value directly.
    ///
    /// This turns the computed into a plain signal: its function is dropped
    /// and it stops observing its sources.
    pub fn set(&self, value: T) {
        or_panic(runtime::write(self.id, Box::new(value)))
    }

    /// Overwrite the value with one computed from the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.read());
        self.set(next);
    }

    /// Current staleness state.
    pub fn state(&self) -> NodeState {
        or_panic(runtime::state_of(self.id))
    }

    /// Whether the function has been evaluated at least once.
    pub fn has_value(&self) -> bool {
        runtime::with_runtime(|rt| rt.node(self.id).is_ok_and(|node| node.value.is_some()))
    }

    /// Number of nodes read during the last evaluation.
    pub fn source_count(&self) -> usize {
        runtime::with_runtime(|rt| rt.node(self.id).map_or(0, |node| node.sources.len()))
    }

    /// Number of computations currently reading this computed.
    pub fn observer_count(&self) -> usize {
        runtime::with_runtime(|rt| rt.node(self.id).map_or(0, |node| node.observers.len()))
    }

    /// Number of times the function has completed.
    pub fn run_count(&self) -> usize {
        runtime::with_runtime(|rt| rt.node(self.id).map_or(0, |node| node.runs))
    }

    /// Remove the computed from the graph, running its cleanups.
    pub fn dispose(self) {
        runtime::dispose(self.id);
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Computed<T> {}

impl<T: Clone + Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id)
            .field("state", &runtime::state_of(self.id).ok())
            .field("has_value", &self.has_value())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

/// Create a computed.
pub fn computed<T: Clone + PartialEq + 'static>(compute: impl Fn() -> T + 'static) -> Computed<T> {
    Computed::new(compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
