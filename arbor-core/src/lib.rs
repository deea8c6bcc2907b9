//! Arbor Core
//!
//! This crate provides a fine-grained reactive dependency graph and
//! structural stores built on top of it. It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Push-pull invalidation with a three-state (`Fresh`/`Check`/`Dirty`)
//!   staleness model, so derived values recompute at most once per change
//!   and only when they are read
//! - An eager effect queue with re-entrant flush coalescing and batching
//! - Structural stores: nested values exposed as lazily materialized path
//!   nodes, with a structural differ that invalidates only the paths a
//!   write actually changed
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: node storage, generational ids and the effect scheduler
//! - `reactive`: the thread-local runtime, dependency tracking and the typed
//!   `Signal`/`Computed`/`Effect` handles
//! - `store`: `Store`/`Proxy` path nodes, array interception and diffing
//! - `config`: per-thread runtime settings
//! - `error`: the crate's error type
//!
//! # Example
//!
//! ```rust
//! use arbor_core::{computed, effect, signal};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! // Create a signal
//! let count = signal(0);
//!
//! // Create a derived value
//! let doubled = computed(move || count.get() * 2);
//!
//! // Create an effect
//! let seen = Rc::new(Cell::new(0));
//! let seen_in = seen.clone();
//! let _effect = effect(move || seen_in.set(doubled.get()));
//!
//! // Update the signal; the effect runs before `set` returns
//! count.set(5);
//! assert_eq!(seen.get(), 10);
//! ```
//!
//! # Threading
//!
//! Each thread has its own runtime. Handles are `Copy` ids that are only
//! meaningful on the thread that created them.

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod store;

pub use config::{configure, current_config, ArrayDiff, RuntimeConfig};
pub use error::{ReactiveError, Result};
pub use graph::{batch, NodeId, NodeKind, NodeState};
pub use reactive::{
    computed, effect, is_tracking, node_count, on_cleanup, signal, untrack, watch, Computed,
    Effect, Signal,
};
pub use store::{reactive, PathKey, Proxy, Store};
