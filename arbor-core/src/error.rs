//! Error types for the reactive graph and structural stores.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors raised by graph and store operations.
///
/// Shape mismatches found while diffing are never errors; they select the
/// coarse invalidation path instead.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// The handle refers to a node that has been disposed.
    #[error("node {0} has been disposed")]
    Disposed(NodeId),

    /// A node read itself while it was being evaluated.
    #[error("cycle detected: node {0} read itself during evaluation")]
    Cycle(NodeId),

    /// An array-only operation was invoked on a non-array value.
    #[error("value at `{path}` is not an array")]
    NotAnArray { path: String },

    /// A path write needs an object or array parent but found something else.
    #[error("value at `{path}` is not an object or array")]
    NotAContainer { path: String },

    /// A write would pad an array with more than
    /// [`MAX_ARRAY_GAP`](crate::store::MAX_ARRAY_GAP) holes.
    #[error("index {index} is too far past the end of `{path}` (length {len})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    /// A write was attempted through a read-only store.
    #[error("store is read-only, cannot write `{path}`")]
    ReadOnly { path: String },

    /// Conversion between a Rust value and the raw JSON model failed.
    #[error("value conversion failed")]
    Serde(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
