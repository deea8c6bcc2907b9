//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read with `get` inside a running computed or effect,
//!    that computation becomes an observer of the signal.
//!
//! 2. When the signal is written with a value its `equals` considers
//!    different, every observer is marked dirty and the effect queue is
//!    drained before `set` returns.
//!
//! 3. `read` returns the value without establishing a dependency.
//!
//! # Handles
//!
//! `Signal<T>` is a `Copy` handle into the thread's node arena. Copies refer
//! to the same node. The node lives until [`Signal::dispose`] is called.

use std::fmt::{self, Debug};
use std::marker::PhantomData;

use super::{or_panic, runtime};
use crate::error::Result;
use crate::graph::node::{equals_by_eq, equals_with, EqualsFn, Node};
use crate::graph::NodeId;

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust
/// use arbor_core::signal;
///
/// let count = signal(0);
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T> {
    id: NodeId,
    marker: PhantomData<fn() -> T>,
}

impl<T: Clone + 'static> Signal<T> {
    /// Create a new signal compared with `PartialEq`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::from_parts(value, equals_by_eq::<T>())
    }

    /// Create a new signal with a custom equality.
    ///
    /// A write only notifies observers when `equals(old, new)` is false.
    pub fn with_equals(value: T, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self::from_parts(value, equals_with(equals))
    }

    fn from_parts(value: T, equals: EqualsFn) -> Self {
        let id = runtime::create(Node::signal(Box::new(value), equals));
        Self {
            id,
            marker: PhantomData,
        }
    }

    /// Get the signal's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value, recording a dependency if a computation is
    /// running.
    ///
    /// # Panics
    ///
    /// Panics if the signal has been disposed.
    pub fn get(&self) -> T {
        or_panic(self.try_get())
    }

    /// Like [`Signal::get`], but reports a disposed signal as an error.
    pub fn try_get(&self) -> Result<T> {
        runtime::get(self.id)
    }

    /// Get the current value without recording a dependency.
    pub fn read(&self) -> T {
        or_panic(runtime::read(self.id))
    }

    /// Set a new value and run affected effects.
    pub fn set(&self, value: T) {
        or_panic(self.try_set(value))
    }

    /// Like [`Signal::set`], but reports a disposed signal as an error.
    pub fn try_set(&self, value: T) -> Result<()> {
        runtime::write(self.id, Box::new(value))
    }

    /// Set a new value computed from the previous one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.read());
        self.set(next);
    }

    /// Number of computations currently reading this signal.
    pub fn observer_count(&self) -> usize {
        runtime::with_runtime(|rt| rt.node(self.id).map_or(0, |node| node.observers.len()))
    }

    /// Remove the signal from the graph. Observers keep their last value.
    pub fn dispose(self) {
        runtime::dispose(self.id);
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Signal<T> {}

impl<T> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Signal<T> {}

impl<T: Clone + Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &runtime::read::<T>(self.id).ok())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

/// Create a signal.
pub fn signal<T: Clone + PartialEq + 'static>(value: T) -> Signal<T> {
    Signal::new(value)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::reactive::{computed, effect};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn signal_get_and_set() {
        let signal = signal(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update_passes_previous_value() {
        let signal = signal(0);
        let mut seen = Vec::new();
        for _ in 0..3 {
            signal.update(|prev| prev + 1);
            seen.push(signal.get());
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn equal_write_does_not_notify() {
        let source = signal(String::from("a"));
        let runs = Rc::new(Cell::new(0));
        let runs_in = runs.clone();
        let _effect = effect(move || {
            source.get();
            runs_in.set(runs_in.get() + 1);
        });

        source.set(String::from("a"));
        assert_eq!(runs.get(), 1);

        source.set(String::from("b"));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn custom_equality_suppresses_notification() {
        let bucket = Signal::with_equals(10, |a: &i32, b: &i32| a / 10 == b / 10);
        let tens = computed(move || bucket.get() / 10);
        assert_eq!(tens.get(), 1);

        bucket.set(15);
        assert_eq!(bucket.read(), 10);

        bucket.set(25);
        assert_eq!(tens.get(), 2);
    }

    #[test]
    fn copies_share_the_node() {
        let a = signal(0);
        let b = a;

        a.set(42);
        assert_eq!(b.get(), 42);
        assert_eq!(a, b);
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = signal(0);
        let s2 = signal(0);
        let s3 = signal(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }

    #[test]
    fn disposed_signal_reports_error() {
        let s = signal(1);
        s.dispose();
        assert!(matches!(s.try_get(), Err(ReactiveError::Disposed(_))));
        assert!(s.try_set(2).is_err());
    }
}
