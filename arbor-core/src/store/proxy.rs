//! Store proxies: lazily materialized path nodes over a raw value.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::diff::{self, WriteKind};
use super::{check_array_gap, format_path, PathKey, ProxyLinks, RootCell};
use crate::error::{ReactiveError, Result};
use crate::graph::node::{equals_by_eq, AnyValue, ComputeFn, Node};
use crate::graph::scheduler::run_effects;
use crate::graph::{NodeId, NodeState};
use crate::reactive::runtime::{self, with_runtime};
use crate::reactive::{or_panic, Runtime};

/// A reactive store over a nested raw value.
///
/// # Example
///
/// ```rust
/// use arbor_core::Store;
/// use serde_json::json;
///
/// let store = Store::from_value(json!({ "user": { "name": "ada" } }));
/// let name = store.root().at("user").at("name");
/// assert_eq!(name.get(), Some(json!("ada")));
///
/// name.set("grace").unwrap();
/// assert_eq!(store.snapshot(), json!({ "user": { "name": "grace" } }));
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Store {
    root: Proxy,
}

impl Store {
    /// Build a store from any serializable value.
    pub fn new<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::from_value(serde_json::to_value(value)?))
    }

    /// Build a store from a raw value.
    pub fn from_value(value: Value) -> Self {
        Self::with_root(RootCell::new(value, false))
    }

    /// Build a store that rejects every write.
    pub fn read_only(value: Value) -> Self {
        Self::with_root(RootCell::new(value, true))
    }

    fn with_root(root: RootCell) -> Self {
        let links = ProxyLinks {
            root: Rc::new(root),
            parent: None,
            key: None,
            path: Rc::from(Vec::new()),
            children: None,
        };
        Self {
            root: Proxy {
                id: runtime::create(proxy_node(links)),
            },
        }
    }

    /// The proxy for the whole value.
    pub fn root(&self) -> Proxy {
        self.root
    }

    /// Whether writes are rejected.
    pub fn is_read_only(&self) -> bool {
        or_panic(self.root.with_links(|links| links.root.is_read_only()))
    }

    /// Clone the current raw value without tracking.
    pub fn snapshot(&self) -> Value {
        or_panic(self.root.with_links(|links| links.root.snapshot()))
    }

    /// Dispose every node of the store.
    pub fn dispose(self) {
        self.root.dispose();
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("root", &self.root).finish()
    }
}

/// Wrap a raw value in a store and return its root proxy.
pub fn reactive(value: Value) -> Proxy {
    Store::from_value(value).root()
}

/// Build the node for one path. Its function clones the slice at that path
/// out of the shared root.
fn proxy_node(links: ProxyLinks) -> Node {
    let root = links.root.clone();
    let path = links.path.clone();
    let compute: ComputeFn = Rc::new(move || Box::new(root.slice(&path)) as AnyValue);
    Node::proxy(compute, equals_by_eq::<Option<Value>>(), links)
}

/// Handle to one path in a [`Store`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Proxy {
    id: NodeId,
}

impl Proxy {
    /// Get the proxy's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn with_links<R>(&self, f: impl FnOnce(&ProxyLinks) -> R) -> Result<R> {
        with_runtime(|rt| links(rt, self.id).map(f))
    }

    /// The last path segment, or `None` for the root.
    pub fn key(&self) -> Option<PathKey> {
        self.with_links(|links| links.key.clone()).ok().flatten()
    }

    /// Full path from the root.
    pub fn path(&self) -> Vec<PathKey> {
        self.with_links(|links| links.path.to_vec()).unwrap_or_default()
    }

    pub(crate) fn path_string(&self) -> String {
        format_path(&self.path())
    }

    /// The parent proxy, or `None` for the root.
    pub fn parent(&self) -> Option<Proxy> {
        self.with_links(|links| links.parent)
            .ok()
            .flatten()
            .map(|id| Proxy { id })
    }

    /// The child proxy at `key`, creating its node on first access.
    ///
    /// Navigation reads nothing and records no dependency.
    ///
    /// # Panics
    ///
    /// Panics if this proxy has been disposed.
    pub fn at(&self, key: impl Into<PathKey>) -> Proxy {
        or_panic(self.try_at(key))
    }

    /// Like [`Proxy::at`], but reports a disposed proxy as an error.
    pub fn try_at(&self, key: impl Into<PathKey>) -> Result<Proxy> {
        let id = with_runtime(|rt| child_proxy(rt, self.id, key.into()))?;
        Ok(Proxy { id })
    }

    /// Whether a child node exists for `key`.
    pub fn is_materialized(&self, key: impl Into<PathKey>) -> bool {
        let key = key.into();
        self.with_links(|links| links.child(&key).is_some())
            .unwrap_or(false)
    }

    /// Number of materialized children.
    pub fn child_count(&self) -> usize {
        self.with_links(|links| links.child_ids().count())
            .unwrap_or(0)
    }

    /// Staleness of this path's node. `Dirty` after a write changed (or
    /// coarsely invalidated) the slice and nobody has read it since.
    pub fn state(&self) -> Result<NodeState> {
        runtime::state_of(self.id)
    }

    /// Current slice, recording a dependency. `None` means the path does
    /// not exist.
    ///
    /// # Panics
    ///
    /// Panics if this proxy has been disposed.
    pub fn get(&self) -> Option<Value> {
        or_panic(self.try_get())
    }

    /// Like [`Proxy::get`], but reports a disposed proxy as an error.
    pub fn try_get(&self) -> Result<Option<Value>> {
        runtime::get(self.id)
    }

    /// Current slice without recording a dependency.
    pub fn read(&self) -> Option<Value> {
        or_panic(runtime::read(self.id))
    }

    /// Tracked read deserialized into `T`.
    pub fn get_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self.try_get()? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Replace the slice at this path.
    pub fn set<V: Serialize>(&self, value: V) -> Result<()> {
        self.set_value(serde_json::to_value(value)?)
    }

    /// Replace the slice at this path with a raw value.
    pub fn set_value(&self, value: Value) -> Result<()> {
        self.assign(Some(value))
    }

    /// Remove this path: deletes an object key, or leaves a `null` hole in
    /// an array.
    pub fn remove(&self) -> Result<()> {
        self.assign(None)
    }

    /// Replace the slice with one computed from the current slice.
    pub fn update(&self, f: impl FnOnce(Option<&Value>) -> Value) -> Result<()> {
        let current = self.raw_slice()?;
        self.set_value(f(current.as_ref()))
    }

    /// Number of elements, as a tracked read of the array's length.
    pub fn len(&self) -> Result<usize> {
        let length = self.try_at(PathKey::Length)?;
        length
            .try_get()?
            .and_then(|len| len.as_u64())
            .map(|len| len as usize)
            .ok_or_else(|| ReactiveError::NotAnArray {
                path: self.path_string(),
            })
    }

    /// Whether the array is empty (tracked).
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Dispose this proxy and every materialized child under it.
    pub fn dispose(&self) {
        runtime::dispose(self.id);
    }

    /// Untracked clone of the raw slice, read straight from the root.
    pub(crate) fn raw_slice(&self) -> Result<Option<Value>> {
        self.with_links(|links| links.root.slice(&links.path))
    }

    fn assign(&self, value: Option<Value>) -> Result<()> {
        let (key, parent) = self.with_links(|links| (links.key.clone(), links.parent))?;
        match (key, parent) {
            (Some(PathKey::Length), _) => Err(ReactiveError::ReadOnly {
                path: self.path_string(),
            }),
            (Some(PathKey::Index(index)), Some(parent)) => {
                let parent = Proxy { id: parent };
                let len = match parent.raw_slice()? {
                    Some(Value::Array(items)) if index >= items.len() => items.len(),
                    _ => return self.write(value, WriteKind::Replace),
                };
                if value.is_some() {
                    check_array_gap(&parent.path(), index, len)?;
                }
                // Growing an array shifts its length and may fill holes;
                // diff it as an array mutation of the parent.
                parent.mutate_array(|items| {
                    if let Some(value) = value {
                        items.resize(index, Value::Null);
                        items.push(value);
                    }
                })
            }
            _ => self.write(value, WriteKind::Replace),
        }
    }

    /// Write `value` at this path, invalidate what changed and flush.
    pub(crate) fn write(&self, value: Option<Value>, kind: WriteKind) -> Result<()> {
        let (root, path, parent) = self.with_links(|links| {
            (links.root.clone(), links.path.clone(), links.parent)
        })?;
        if root.is_read_only() {
            return Err(ReactiveError::ReadOnly {
                path: format_path(&path),
            });
        }

        let old = root.replace(&path, value.clone())?;
        if old == value {
            return Ok(());
        }

        with_runtime(|rt| {
            // Every ancestor now holds a different value.
            let mut ancestor = parent;
            while let Some(id) = ancestor {
                rt.mark_stale(id, NodeState::Dirty);
                ancestor = links(rt, id).ok().and_then(|links| links.parent);
            }
            if let Some(length) = parent
                .and_then(|id| links(rt, id).ok())
                .and_then(|links| links.child(&PathKey::Length))
            {
                rt.mark_stale(length, NodeState::Dirty);
            }

            let policy = rt.config.array_diff;
            diff::apply(rt, self.id, old.as_ref(), value.as_ref(), kind, policy);
        });

        run_effects();
        Ok(())
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("id", &self.id)
            .field("path", &self.path_string())
            .finish()
    }
}

pub(crate) fn links(rt: &Runtime, id: NodeId) -> Result<&ProxyLinks> {
    rt.node(id)?
        .proxy
        .as_deref()
        .ok_or(ReactiveError::Disposed(id))
}

/// Return the child of `parent` at `key`, creating and caching it if needed.
fn child_proxy(rt: &mut Runtime, parent: NodeId, key: PathKey) -> Result<NodeId> {
    let parent_links = links(rt, parent)?;
    if let Some(id) = parent_links.child(&key) {
        return Ok(id);
    }

    let mut path = parent_links.path.to_vec();
    path.push(key.clone());
    let child = ProxyLinks {
        root: parent_links.root.clone(),
        parent: Some(parent),
        key: Some(key.clone()),
        path: Rc::from(path),
        children: None,
    };
    let id = rt.nodes.insert(proxy_node(child));
    tracing::trace!(node = %id, parent = %parent, key = %key, "proxy materialized");

    if let Some(links) = rt.node_mut(parent)?.proxy.as_mut() {
        links.children.get_or_insert_with(IndexMap::new).insert(key, id);
    }
    Ok(id)
}
