//! Dependency Graph
//!
//! This module holds the storage side of the reactive graph: the node
//! record, the arena the nodes live in, and the effect queue.
//!
//! # Overview
//!
//! Every signal, computed, effect and store proxy is a [`node::Node`] in
//! one arena. Edges are stored on both ends:
//!
//! - `sources`: the nodes a node read during its last evaluation, in order
//! - `observers`: the nodes that read this node during their last evaluation
//!
//! Symmetry holds for every pair: `n` is in `a.observers` exactly when `a`
//! is in `n.sources`. Both sides of an edge are always updated together.
//!
//! # Design Decisions
//!
//! 1. Nodes are addressed by generational indices rather than pointers, so
//!    the two-way edge lists cannot form ownership cycles and a disposed node
//!    can never be confused with the node that reuses its slot.
//!
//! 2. Values are type-erased in the node; the typed handles in `reactive`
//!    and `store` do the downcasting.
//!
//! 3. Observer links are weak in the ownership sense. They are removed
//!    explicitly whenever a node's source set changes or a node is disposed.

mod arena;
pub(crate) mod node;
pub(crate) mod scheduler;

pub use arena::NodeId;
pub use node::{NodeKind, NodeState};
pub use scheduler::batch;

pub(crate) use arena::Arena;
