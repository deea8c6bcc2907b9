//! Structural Differ
//!
//! Decides, for one write, which materialized nodes under the written node
//! saw their slice change.
//!
//! # Algorithm
//!
//! Given the written node and its old and new slices:
//!
//! 1. Equal slices: nothing to do.
//! 2. Both objects (or both arrays, when the array policy allows): visit the
//!    materialized children only. For each child compare its old and new
//!    slice:
//!    - the key disappeared, or the shapes differ: invalidate the child's
//!      whole subtree;
//!    - both primitives: invalidate the child if they differ;
//!    - both containers of the same kind: recurse.
//!    Then invalidate the node itself, since its own value differs.
//! 3. Anything else (shape change, primitive change, array under a coarse
//!    policy): invalidate the node's whole subtree.
//!
//! Unmaterialized parts of the structure are never visited, so the cost of
//! a write follows what has been read rather than the size of the value.
//! Invalidating a node marks it `Dirty`; whether its observers re-run is then
//! decided by the usual equality check when it recomputes.

use serde_json::Value;

use super::proxy::links;
use super::{lookup, PathKey, Shape};
use crate::config::ArrayDiff;
use crate::graph::{NodeId, NodeState};
use crate::reactive::Runtime;

/// How the new value was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
    /// The slice was replaced by `set`.
    Replace,

    /// The slice is a copy of the old array with a mutator applied.
    ArrayMutation,
}

struct Differ<'a> {
    rt: &'a mut Runtime,
    nested_positional: bool,
    precise: usize,
    coarse: usize,
}

/// Invalidate the nodes under `node` whose slice changed from `old` to `new`.
pub(crate) fn apply(
    rt: &mut Runtime,
    node: NodeId,
    old: Option<&Value>,
    new: Option<&Value>,
    kind: WriteKind,
    policy: ArrayDiff,
) {
    let top_positional = match policy {
        ArrayDiff::Positional => true,
        ArrayDiff::MutatorsOnly => kind == WriteKind::ArrayMutation,
        ArrayDiff::Coarse => false,
    };
    let mut differ = Differ {
        rt,
        nested_positional: policy == ArrayDiff::Positional,
        precise: 0,
        coarse: 0,
    };
    differ.diff(node, old, new, top_positional);
    tracing::debug!(
        node = %node,
        ?kind,
        precise = differ.precise,
        coarse = differ.coarse,
        "structural diff applied"
    );
}

impl Differ<'_> {
    fn diff(&mut self, node: NodeId, old: Option<&Value>, new: Option<&Value>, positional: bool) {
        if old == new {
            return;
        }
        let (Some(old_value), Some(new_value)) = (old, new) else {
            self.invalidate_subtree(node);
            return;
        };

        match (Shape::of(old), Shape::of(new)) {
            (Shape::Object, Shape::Object) => {}
            (Shape::Array, Shape::Array) if positional => {}
            _ => {
                self.invalidate_subtree(node);
                return;
            }
        }

        for (key, child) in self.children(node) {
            if key == PathKey::Length {
                if old_value.as_array().map(Vec::len) != new_value.as_array().map(Vec::len) {
                    self.mark_dirty(child);
                }
                continue;
            }

            let old_child = lookup(old_value, &key);
            let new_child = lookup(new_value, &key);
            let (old_shape, new_shape) = (Shape::of(old_child), Shape::of(new_child));

            if new_shape == Shape::Missing || old_shape != new_shape {
                if old_child != new_child {
                    self.invalidate_subtree(child);
                }
            } else if old_shape.is_container() {
                self.diff(child, old_child, new_child, self.nested_positional);
            } else if old_child != new_child {
                self.mark_dirty(child);
            }
        }

        self.mark_dirty(node);
    }

    fn children(&self, node: NodeId) -> Vec<(PathKey, NodeId)> {
        links(self.rt, node)
            .ok()
            .and_then(|links| links.children.as_ref())
            .map(|children| {
                children
                    .iter()
                    .map(|(key, id)| (key.clone(), *id))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn mark_dirty(&mut self, node: NodeId) {
        self.precise += 1;
        self.rt.mark_stale(node, NodeState::Dirty);
    }

    /// Treat everything at and below `node` as replaced.
    fn invalidate_subtree(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            self.coarse += 1;
            self.rt.mark_stale(id, NodeState::Dirty);
            stack.extend(self.children(id).into_iter().map(|(_, child)| child));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::with_runtime;
    use crate::store::{reactive, Proxy};
    use serde_json::json;

    fn state(proxy: Proxy) -> NodeState {
        proxy.state().unwrap()
    }

    fn settle(proxies: &[Proxy]) {
        for proxy in proxies {
            proxy.read();
        }
    }

    fn run(root: Proxy, old: Value, new: Value, kind: WriteKind, policy: ArrayDiff) {
        with_runtime(|rt| apply(rt, root.id(), Some(&old), Some(&new), kind, policy));
    }

    #[test]
    fn only_changed_leaves_are_dirtied() {
        let old = json!({ "a": { "x": 1, "y": 2 }, "b": 3 });
        let root = reactive(old.clone());
        let (a, x, y, b) = (root.at("a"), root.at("a").at("x"), root.at("a").at("y"), root.at("b"));
        settle(&[root, a, x, y, b]);

        let new = json!({ "a": { "x": 1, "y": 20 }, "b": 3 });
        run(root, old, new, WriteKind::Replace, ArrayDiff::Positional);

        assert_eq!(state(root), NodeState::Dirty);
        assert_eq!(state(a), NodeState::Dirty);
        assert_eq!(state(y), NodeState::Dirty);
        assert_eq!(state(x), NodeState::Fresh);
        assert_eq!(state(b), NodeState::Fresh);
    }

    #[test]
    fn shape_change_invalidates_subtree() {
        let old = json!({ "a": { "b": 1 }, "c": 1 });
        let root = reactive(old.clone());
        let (a, b, c) = (root.at("a"), root.at("a").at("b"), root.at("c"));
        settle(&[root, a, b, c]);

        run(root, old, json!({ "a": 5, "c": 1 }), WriteKind::Replace, ArrayDiff::Positional);

        assert_eq!(state(a), NodeState::Dirty);
        assert_eq!(state(b), NodeState::Dirty);
        assert_eq!(state(c), NodeState::Fresh);
    }

    #[test]
    fn removed_key_invalidates_child() {
        let old = json!({ "a": { "b": 1 }, "c": 1 });
        let root = reactive(old.clone());
        let (a, b) = (root.at("a"), root.at("a").at("b"));
        settle(&[root, a, b]);

        run(root, old, json!({ "c": 1 }), WriteKind::Replace, ArrayDiff::Positional);
        assert_eq!(state(a), NodeState::Dirty);
        assert_eq!(state(b), NodeState::Dirty);
    }

    #[test]
    fn positional_array_diff_compares_by_index() {
        let old = json!([{ "n": 1 }, { "n": 2 }]);
        let root = reactive(old.clone());
        let (first, second) = (root.at(0).at("n"), root.at(1).at("n"));
        let length = root.at(PathKey::Length);
        settle(&[root, first, second, length]);

        run(root, old, json!([{ "n": 1 }, { "n": 5 }]), WriteKind::Replace, ArrayDiff::Positional);
        assert_eq!(state(first), NodeState::Fresh);
        assert_eq!(state(second), NodeState::Dirty);
        assert_eq!(state(length), NodeState::Fresh);
    }

    #[test]
    fn coarse_policy_invalidates_all_elements() {
        let old = json!([{ "n": 1 }, { "n": 2 }]);
        let root = reactive(old.clone());
        let (first, second) = (root.at(0).at("n"), root.at(1).at("n"));
        settle(&[root, first, second]);

        run(root, old, json!([{ "n": 1 }, { "n": 5 }]), WriteKind::ArrayMutation, ArrayDiff::Coarse);
        assert_eq!(state(first), NodeState::Dirty);
        assert_eq!(state(second), NodeState::Dirty);
    }

    #[test]
    fn mutators_only_policy_distinguishes_write_kind() {
        let old = json!([1, 2]);
        let new = json!([1, 3]);

        let root = reactive(old.clone());
        let first = root.at(0);
        settle(&[root, first]);
        run(root, old.clone(), new.clone(), WriteKind::ArrayMutation, ArrayDiff::MutatorsOnly);
        assert_eq!(state(first), NodeState::Fresh);

        let root = reactive(old.clone());
        let first = root.at(0);
        settle(&[root, first]);
        run(root, old, new, WriteKind::Replace, ArrayDiff::MutatorsOnly);
        assert_eq!(state(first), NodeState::Dirty);
    }

    #[test]
    fn unmaterialized_paths_are_not_created() {
        let old = json!({ "a": { "b": { "c": 1 } } });
        let root = reactive(old.clone());
        settle(&[root]);

        run(root, old, json!({ "a": { "b": { "c": 2 } } }), WriteKind::Replace, ArrayDiff::Positional);
        assert_eq!(root.child_count(), 0);
        assert_eq!(state(root), NodeState::Dirty);
    }
}
