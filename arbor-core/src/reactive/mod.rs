//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects. These primitives form the foundation of Arbor's fine-grained
//! reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed or effect), the signal
//! automatically registers that context as an observer. When the signal's
//! value changes, all observers are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when one of its sources changes, and only when it is read.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its sources
//! change. Effects are used to synchronize reactive state with external
//! systems, such as patching a DOM or logging.
//!
//! # Implementation Notes
//!
//! The reactive system keeps a thread-local runtime holding the node arena,
//! the tracking stack and the effect queue. When a node is read, we check
//! whether a computation is running and, if so, record the read in its
//! tracking frame.

mod computed;
mod context;
mod effect;
pub(crate) mod runtime;
mod signal;

pub use computed::{computed, Computed};
pub use context::{is_tracking, untrack};
pub use effect::{effect, watch, Effect};
pub use runtime::{node_count, on_cleanup};
pub use signal::{signal, Signal};

pub(crate) use runtime::{try_with_runtime, with_runtime, Runtime};

use crate::error::Result;

/// Unwrap a result whose error means the handle was misused.
pub(crate) fn or_panic<T>(result: Result<T>) -> T {
    result.unwrap_or_else(|err| panic!("{err}"))
}
