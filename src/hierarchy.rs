//! Desktop hierarchy rebuilding
//!
//! The backend stores desktops as a flat list of parent pointers. This module
//! turns such a list into a leveled forest:
//! 1. Roots are the nodes without a parent, at level 0
//! 2. Children of a node are the nodes pointing at it, ordered by `position_order`
//!    (ties keep input order)
//! 3. Anything deeper than `max_depth` is dropped
//!
//! Nodes that point at a missing parent, or that sit on a parent cycle, are never
//! reached from a root and so never appear. `detached_ids` reports them.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_MAX_DEPTH: usize = 10;

/// A row that knows its place in a parent-pointer tree.
pub trait TreeNode {
    fn node_id(&self) -> &str;
    fn parent_id(&self) -> Option<&str>;
    fn position_order(&self) -> i64;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyNode<T> {
    #[serde(flatten)]
    pub item: T,
    pub level: usize,
    pub children: Vec<HierarchyNode<T>>,
}

/// One row of the pre-order flattening of a forest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeveledRow<T> {
    #[serde(flatten)]
    pub item: T,
    pub level: usize,
}

/// Parent id -> children, each bucket sorted by position_order.
fn children_index<T: TreeNode>(items: &[T]) -> HashMap<Option<&str>, Vec<&T>> {
    let mut index: HashMap<Option<&str>, Vec<&T>> = HashMap::new();
    for item in items {
        index.entry(item.parent_id()).or_default().push(item);
    }
    for bucket in index.values_mut() {
        // stable sort, so equal keys keep input order
        bucket.sort_by_key(|n| n.position_order());
    }
    index
}

fn expand<T: TreeNode + Clone>(
    index: &HashMap<Option<&str>, Vec<&T>>,
    parent: Option<&str>,
    level: usize,
    max_depth: usize,
    placed: &mut HashSet<String>,
) -> Vec<HierarchyNode<T>> {
    if level > max_depth {
        return Vec::new();
    }
    let Some(bucket) = index.get(&parent) else {
        return Vec::new();
    };

    let mut nodes = Vec::with_capacity(bucket.len());
    for item in bucket {
        // a repeated id would otherwise re-enter its own subtree
        if !placed.insert(item.node_id().to_string()) {
            continue;
        }
        let children = expand(index, Some(item.node_id()), level + 1, max_depth, placed);
        nodes.push(HierarchyNode {
            item: (*item).clone(),
            level,
            children,
        });
    }
    nodes
}

/// Build the leveled forest for `items`. Pure; empty input gives an empty forest.
pub fn build_forest<T: TreeNode + Clone>(items: &[T], max_depth: usize) -> Vec<HierarchyNode<T>> {
    let index = children_index(items);
    let mut placed = HashSet::new();
    expand(&index, None, 0, max_depth, &mut placed)
}

/// Pre-order walk of a forest into leveled rows.
pub fn flatten<T: Clone>(forest: &[HierarchyNode<T>]) -> Vec<LeveledRow<T>> {
    fn walk<T: Clone>(nodes: &[HierarchyNode<T>], out: &mut Vec<LeveledRow<T>>) {
        for node in nodes {
            out.push(LeveledRow {
                item: node.item.clone(),
                level: node.level,
            });
            walk(&node.children, out);
        }
    }
    let mut out = Vec::new();
    walk(forest, &mut out);
    out
}

/// Ids present in the forest.
pub fn placed_ids<T: TreeNode>(forest: &[HierarchyNode<T>]) -> HashSet<String> {
    let mut ids = HashSet::new();
    let mut stack: Vec<&HierarchyNode<T>> = forest.iter().collect();
    while let Some(node) = stack.pop() {
        ids.insert(node.item.node_id().to_string());
        stack.extend(node.children.iter());
    }
    ids
}

/// Input ids that did not make it into the forest (orphaned, cyclic or too deep),
/// in input order.
pub fn detached_ids<T: TreeNode>(items: &[T], forest: &[HierarchyNode<T>]) -> Vec<String> {
    let placed = placed_ids(forest);
    let mut seen = HashSet::new();
    items
        .iter()
        .map(|i| i.node_id())
        .filter(|id| !placed.contains(*id) && seen.insert(*id))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct D {
        id: String,
        parent: Option<String>,
        order: i64,
    }

    impl TreeNode for D {
        fn node_id(&self) -> &str {
            &self.id
        }
        fn parent_id(&self) -> Option<&str> {
            self.parent.as_deref()
        }
        fn position_order(&self) -> i64 {
            self.order
        }
    }

    fn d(id: &str, parent: Option<&str>, order: i64) -> D {
        D { id: id.to_string(), parent: parent.map(str::to_string), order }
    }

    fn chain(n: usize) -> Vec<D> {
        (0..n)
            .map(|i| {
                let parent = if i == 0 { None } else { Some(format!("d{}", i - 1)) };
                D { id: format!("d{}", i), parent, order: 0 }
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let forest: Vec<HierarchyNode<D>> = build_forest(&[], DEFAULT_MAX_DEPTH);
        assert!(forest.is_empty());
    }

    #[test]
    fn test_children_sorted_by_position() {
        let items = vec![
            d("b", Some("root"), 2),
            d("root", None, 0),
            d("a", Some("root"), 1),
            d("c", Some("root"), 2),
        ];
        let forest = build_forest(&items, DEFAULT_MAX_DEPTH);
        assert_eq!(forest.len(), 1);
        let root = &forest[0];
        assert_eq!(root.level, 0);
        let kids: Vec<&str> = root.children.iter().map(|c| c.item.id.as_str()).collect();
        // b and c tie on order 2 and keep input order
        assert_eq!(kids, vec!["a", "b", "c"]);
        assert!(root.children.iter().all(|c| c.level == 1));
    }

    #[test]
    fn test_build_is_idempotent() {
        let items = vec![d("r", None, 0), d("x", Some("r"), 1), d("y", Some("x"), 0)];
        assert_eq!(build_forest(&items, 10), build_forest(&items, 10));
    }

    #[test]
    fn test_cycle_is_unreachable() {
        let items = vec![d("a", Some("b"), 0), d("b", Some("a"), 0)];
        let forest = build_forest(&items, DEFAULT_MAX_DEPTH);
        assert!(forest.is_empty());
        assert_eq!(detached_ids(&items, &forest), vec!["a", "b"]);
    }

    #[test]
    fn test_self_parent_and_orphan_are_detached() {
        let items = vec![d("r", None, 0), d("s", Some("s"), 0), d("o", Some("missing"), 0)];
        let forest = build_forest(&items, DEFAULT_MAX_DEPTH);
        assert_eq!(forest.len(), 1);
        assert!(forest[0].children.is_empty());
        assert_eq!(detached_ids(&items, &forest), vec!["s", "o"]);
    }

    #[test]
    fn test_depth_ceiling() {
        let items = chain(15);
        let forest = build_forest(&items, 10);
        let rows = flatten(&forest);
        let levels: Vec<usize> = rows.iter().map(|r| r.level).collect();
        assert_eq!(levels, (0..=10).collect::<Vec<_>>());
        assert_eq!(detached_ids(&items, &forest), vec!["d11", "d12", "d13", "d14"]);
    }

    #[test]
    fn test_duplicate_root_id_does_not_recurse() {
        let items = vec![d("r", None, 0), d("r", Some("r"), 1)];
        let forest = build_forest(&items, DEFAULT_MAX_DEPTH);
        assert_eq!(flatten(&forest).len(), 1);
    }

    #[test]
    fn test_flatten_is_preorder() {
        let items = vec![
            d("r1", None, 0),
            d("r2", None, 1),
            d("a", Some("r1"), 0),
            d("a1", Some("a"), 0),
            d("b", Some("r1"), 1),
        ];
        let rows = flatten(&build_forest(&items, DEFAULT_MAX_DEPTH));
        let got: Vec<(&str, usize)> = rows.iter().map(|r| (r.item.id.as_str(), r.level)).collect();
        assert_eq!(got, vec![("r1", 0), ("a", 1), ("a1", 2), ("b", 1), ("r2", 0)]);
    }

    #[test]
    fn test_node_serializes_flat() {
        let forest = build_forest(&[d("r", None, 0)], DEFAULT_MAX_DEPTH);
        let json = serde_json::to_value(&forest[0]).unwrap();
        assert_eq!(json["id"], "r");
        assert_eq!(json["level"], 0);
        assert!(json["children"].as_array().unwrap().is_empty());
    }
}
