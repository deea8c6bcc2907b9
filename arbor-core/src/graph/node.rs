//! Graph Nodes
//!
//! This module defines the node record stored in the arena. Signals,
//! computeds, effects and store proxies are all the same record; the
//! differences are whether a derivation function is present, whether the
//! node is an effect, and whether it carries proxy links.
//!
//! Values are type-erased (`Box<dyn Any>`). Graph operations never need the
//! value type; only the typed handles downcast.

use std::any::Any;
use std::rc::Rc;

use smallvec::SmallVec;

use super::NodeId;
use crate::store::ProxyLinks;

/// Type-erased node value.
pub(crate) type AnyValue = Box<dyn Any>;

/// Derivation function of a computed, effect or proxy node.
pub(crate) type ComputeFn = Rc<dyn Fn() -> AnyValue>;

/// Equality used to decide whether a new value is a change.
pub(crate) type EqualsFn = Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>;

/// Teardown callback registered with `on_cleanup`.
pub(crate) type Cleanup = Box<dyn FnOnce()>;

/// Edge lists are short in practice; keep them inline.
pub(crate) type EdgeList = SmallVec<[NodeId; 4]>;

/// What kind of node this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A directly settable value with no derivation function.
    Signal,

    /// A cached value derived from other nodes.
    Computed,

    /// A side-effecting computation, re-run when its sources change.
    Effect,

    /// One path into a structural store.
    Proxy,
}

/// Staleness of a node.
///
/// The ordering matters: propagation only ever raises a node's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeState {
    /// The cached value is valid.
    Fresh,

    /// Some source further up might be stale. Resolved by walking sources.
    Check,

    /// Known stale; must recompute.
    Dirty,
}

/// A node in the reactive graph.
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) state: NodeState,

    /// Last stored or computed value. `None` until first evaluation.
    pub(crate) value: Option<AnyValue>,

    /// Present for computed, effect and proxy nodes.
    pub(crate) compute: Option<ComputeFn>,
    pub(crate) equals: EqualsFn,

    /// Nodes read during the last evaluation, in read order.
    pub(crate) sources: EdgeList,

    /// Nodes that read this one during their last evaluation.
    pub(crate) observers: EdgeList,

    pub(crate) cleanups: SmallVec<[Cleanup; 1]>,

    /// Set while `compute` is running; a read in that window is a cycle.
    pub(crate) evaluating: bool,

    /// Effects only: waiting in the effect queue.
    pub(crate) queued: bool,

    /// Completed evaluations.
    pub(crate) runs: usize,

    /// Nodes disposed together with this one.
    pub(crate) owned: EdgeList,

    pub(crate) proxy: Option<Box<ProxyLinks>>,
}

impl Node {
    fn new(kind: NodeKind, state: NodeState, equals: EqualsFn) -> Self {
        Self {
            kind,
            state,
            value: None,
            compute: None,
            equals,
            sources: EdgeList::new(),
            observers: EdgeList::new(),
            cleanups: SmallVec::new(),
            evaluating: false,
            queued: false,
            runs: 0,
            owned: EdgeList::new(),
            proxy: None,
        }
    }

    /// A plain signal holding `value`.
    pub(crate) fn signal(value: AnyValue, equals: EqualsFn) -> Self {
        let mut node = Self::new(NodeKind::Signal, NodeState::Fresh, equals);
        node.value = Some(value);
        node
    }

    /// A computed node. Starts dirty so the first read evaluates it.
    pub(crate) fn computed(compute: ComputeFn, equals: EqualsFn) -> Self {
        let mut node = Self::new(NodeKind::Computed, NodeState::Dirty, equals);
        node.compute = Some(compute);
        node
    }

    /// An effect node. Its value is never observed, so it never compares equal.
    pub(crate) fn effect(compute: ComputeFn) -> Self {
        let mut node = Self::new(NodeKind::Effect, NodeState::Dirty, never_equal());
        node.compute = Some(compute);
        node
    }

    /// A store proxy node deriving its slice through `compute`.
    pub(crate) fn proxy(compute: ComputeFn, equals: EqualsFn, links: ProxyLinks) -> Self {
        let mut node = Self::new(NodeKind::Proxy, NodeState::Dirty, equals);
        node.compute = Some(compute);
        node.proxy = Some(Box::new(links));
        node
    }

    pub(crate) fn is_effect(&self) -> bool {
        self.kind == NodeKind::Effect
    }

    /// Whether `new` counts as a change relative to the stored value.
    pub(crate) fn differs_from(&self, new: &dyn Any) -> bool {
        match &self.value {
            Some(old) => !(self.equals)(old.as_ref(), new),
            None => true,
        }
    }

    /// Register `observer`, keeping observer entries unique.
    pub(crate) fn add_observer(&mut self, observer: NodeId) {
        if !self.observers.contains(&observer) {
            self.observers.push(observer);
        }
    }

    pub(crate) fn remove_observer(&mut self, observer: NodeId) {
        self.observers.retain(|id| *id != observer);
    }
}

/// Equality through `PartialEq` on the concrete value type.
pub(crate) fn equals_by_eq<T: PartialEq + 'static>() -> EqualsFn {
    Rc::new(|a: &dyn Any, b: &dyn Any| match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    })
}

/// Wrap a typed equality function.
pub(crate) fn equals_with<T: 'static>(equals: impl Fn(&T, &T) -> bool + 'static) -> EqualsFn {
    Rc::new(move |a: &dyn Any, b: &dyn Any| match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => equals(a, b),
        _ => false,
    })
}

pub(crate) fn never_equal() -> EqualsFn {
    Rc::new(|_: &dyn Any, _: &dyn Any| false)
}
