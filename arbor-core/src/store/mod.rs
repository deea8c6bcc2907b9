//! Structural Stores
//!
//! A store wraps a nested raw value (a `serde_json::Value`) and exposes it as
//! a tree of reactive nodes, one per path that has actually been accessed.
//!
//! # Concepts
//!
//! ## Proxies
//!
//! A [`Proxy`] is a handle to one path into the store. `proxy.at("key")` or
//! `proxy.at(3)` returns the child proxy, creating its node on first access.
//! Navigation itself reads nothing; `get()` on a proxy is the tracked read.
//! Only paths that have been navigated to have nodes, so a store holding a
//! large document costs nothing for the parts nobody looks at.
//!
//! ## Writes and diffing
//!
//! A write at some path replaces the raw slice there. Every ancestor of the
//! written node now holds a different value and is invalidated as a whole.
//! Below the written node, the structural differ compares the old and new
//! slices along the materialized children only and invalidates just the
//! children whose slice changed. When the two sides have different shapes
//! (object vs array vs primitive) the subtree is invalidated wholesale.
//!
//! Proxy nodes do not observe each other. They are invalidated by writes
//! alone, which is what keeps a write at `items[0].name` from touching
//! anything that only read `items[1].name`.
//!
//! ## Arrays
//!
//! Array proxies intercept the mutating methods (`push`, `splice`, `sort`,
//! ...) by applying them to a copy of the raw array and writing the copy
//! back, which keeps the old array around for element-by-element diffing.
//! The iteration methods (`for_each`, `map`, `filter`, ...) hand each element
//! to the callback as its own child proxy, so reads inside the callback
//! subscribe to individual elements.

mod array;
mod diff;
mod proxy;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

pub use proxy::{reactive, Proxy, Store};

use crate::error::ReactiveError;
use crate::graph::NodeId;
use crate::reactive::Runtime;

/// One segment of a path into a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathKey {
    /// An object property.
    Field(String),

    /// An array element.
    Index(usize),

    /// The length of an array. Reading it is a tracked read like any other.
    Length,
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, ".{name}"),
            Self::Index(index) => write!(f, "[{index}]"),
            Self::Length => f.write_str(".length"),
        }
    }
}

impl From<&str> for PathKey {
    fn from(name: &str) -> Self {
        Self::Field(name.to_owned())
    }
}

impl From<String> for PathKey {
    fn from(name: String) -> Self {
        Self::Field(name)
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Most `null` holes a single write past the end of an array may create.
pub const MAX_ARRAY_GAP: usize = 1 << 16;

/// Reject a write at `index` into an array of length `len` that would pad
/// it with more than [`MAX_ARRAY_GAP`] holes.
pub(crate) fn check_array_gap(path: &[PathKey], index: usize, len: usize) -> Result<(), ReactiveError> {
    if index.saturating_sub(len) > MAX_ARRAY_GAP {
        return Err(ReactiveError::IndexOutOfRange {
            path: format_path(path),
            index,
            len,
        });
    }
    Ok(())
}

/// Render a path as `$.items[1].name`.
pub(crate) fn format_path(path: &[PathKey]) -> String {
    let mut out = String::from("$");
    for key in path {
        out.push_str(&key.to_string());
    }
    out
}

/// Runtime shape of a raw slice, as far as diffing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    /// The path does not exist.
    Missing,
    Null,
    Primitive,
    Array,
    Object,
}

impl Shape {
    pub(crate) fn of(value: Option<&Value>) -> Self {
        match value {
            None => Self::Missing,
            Some(Value::Null) => Self::Null,
            Some(Value::Bool(_) | Value::Number(_) | Value::String(_)) => Self::Primitive,
            Some(Value::Array(_)) => Self::Array,
            Some(Value::Object(_)) => Self::Object,
        }
    }

    pub(crate) fn is_container(self) -> bool {
        matches!(self, Self::Array | Self::Object)
    }
}

/// Look up one path segment. `Length` is synthetic and never found here.
pub(crate) fn lookup<'a>(value: &'a Value, key: &PathKey) -> Option<&'a Value> {
    match key {
        PathKey::Field(name) => value.as_object()?.get(name),
        PathKey::Index(index) => value.as_array()?.get(*index),
        PathKey::Length => None,
    }
}

fn lookup_mut<'a>(value: &'a mut Value, key: &PathKey) -> Option<&'a mut Value> {
    match key {
        PathKey::Field(name) => value.as_object_mut()?.get_mut(name),
        PathKey::Index(index) => value.as_array_mut()?.get_mut(*index),
        PathKey::Length => None,
    }
}

/// The raw value shared by every node of one store.
pub(crate) struct RootCell {
    raw: RefCell<Value>,
    read_only: bool,
}

impl RootCell {
    pub(crate) fn new(raw: Value, read_only: bool) -> Self {
        Self {
            raw: RefCell::new(raw),
            read_only,
        }
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn snapshot(&self) -> Value {
        self.raw.borrow().clone()
    }

    /// Clone the slice at `path`, or `None` if the path does not exist.
    pub(crate) fn slice(&self, path: &[PathKey]) -> Option<Value> {
        let raw = self.raw.borrow();
        let Some((last, parents)) = path.split_last() else {
            return Some(raw.clone());
        };

        let mut current = &*raw;
        for key in parents {
            current = lookup(current, key)?;
        }
        match last {
            PathKey::Length => current.as_array().map(|items| Value::from(items.len())),
            key => lookup(current, key).cloned(),
        }
    }

    /// Replace the slice at `path`, returning the previous slice.
    ///
    /// `None` removes an object key, or leaves a `null` hole in an array.
    /// Writing one past the end of an array appends.
    pub(crate) fn replace(
        &self,
        path: &[PathKey],
        new: Option<Value>,
    ) -> Result<Option<Value>, ReactiveError> {
        let mut raw = self.raw.borrow_mut();
        let Some((last, parents)) = path.split_last() else {
            let new = new.unwrap_or(Value::Null);
            return Ok(Some(std::mem::replace(&mut *raw, new)));
        };

        let not_a_container = || ReactiveError::NotAContainer {
            path: format_path(parents),
        };
        let mut current = &mut *raw;
        for key in parents {
            current = lookup_mut(current, key).ok_or_else(not_a_container)?;
        }

        match (current, last) {
            (Value::Object(map), PathKey::Field(name)) => Ok(match new {
                Some(value) => map.insert(name.clone(), value),
                None => map.remove(name),
            }),
            (Value::Array(items), PathKey::Index(index)) => {
                let index = *index;
                if index < items.len() {
                    let value = new.unwrap_or(Value::Null);
                    return Ok(Some(std::mem::replace(&mut items[index], value)));
                }
                if let Some(value) = new {
                    check_array_gap(parents, index, items.len())?;
                    items.resize(index, Value::Null);
                    items.push(value);
                }
                Ok(None)
            }
            _ => Err(not_a_container()),
        }
    }
}

/// Store bookkeeping carried by every proxy node.
pub(crate) struct ProxyLinks {
    pub(crate) root: Rc<RootCell>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) key: Option<PathKey>,
    pub(crate) path: Rc<[PathKey]>,

    /// Materialized children. Leaves that were never navigated through
    /// have no table at all.
    pub(crate) children: Option<IndexMap<PathKey, NodeId>>,
}

impl ProxyLinks {
    pub(crate) fn child_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().flat_map(|children| children.values().copied())
    }

    pub(crate) fn child(&self, key: &PathKey) -> Option<NodeId> {
        self.children.as_ref()?.get(key).copied()
    }
}

/// Remove a disposed proxy from its parent's child table.
pub(crate) fn detach_from_parent(rt: &mut Runtime, id: NodeId) {
    let Some((parent, key)) = rt
        .nodes
        .get(id)
        .and_then(|node| node.proxy.as_ref())
        .and_then(|links| Some((links.parent?, links.key.clone()?)))
    else {
        return;
    };

    let children = rt
        .nodes
        .get_mut(parent)
        .and_then(|node| node.proxy.as_mut())
        .and_then(|links| links.children.as_mut());
    if let Some(children) = children {
        children.shift_remove(&key);
    }
}
