//! Canonical diff between two data trees.
//!
//! Classification: a node present only in the new tree is `created`, only
//! in the old tree `deleted`, a leaf whose value differs `modified`, and a
//! user-ordered sibling whose relative position changed `moved` (anchored
//! to its preceding sibling in the new order, none for first).
//!
//! Emission order carries the apply contract: creates appear parent before
//! child, deletes child before parent, so replaying the change list top to
//! bottom is always structurally valid.

use std::collections::BTreeMap;

use ystore_error::{Result, StoreError};
use ystore_tree::{DataNode, DataTree, SchemaContext, SchemaNode, SchemaNodeKind};
use ystore_types::{ChangeOperation, Value};

// ---------------------------------------------------------------------------
// Change / Diff
// ---------------------------------------------------------------------------

/// One entry of a change set.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Change {
    pub xpath: String,
    pub op: ChangeOperation,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    /// For `moved`: the preceding sibling after the move, rendered as a
    /// path segment; `None` means it became first.
    pub anchor: Option<String>,
}

/// The classified change set of one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Diff {
    pub changes: Vec<Change>,
}

impl Diff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Modules touched by this diff, sorted (deterministic lock order).
    #[must_use]
    pub fn modules(&self) -> Vec<String> {
        let mut set: Vec<String> = self
            .changes
            .iter()
            .filter_map(|c| module_of(&c.xpath))
            .collect();
        set.sort();
        set.dedup();
        set
    }

    /// Split into per-module diffs, preserving order within each module.
    #[must_use]
    pub fn split_by_module(&self) -> BTreeMap<String, Diff> {
        let mut out: BTreeMap<String, Diff> = BTreeMap::new();
        for c in &self.changes {
            if let Some(m) = module_of(&c.xpath) {
                out.entry(m).or_default().changes.push(c.clone());
            }
        }
        out
    }

    /// Changes under an xpath prefix (a module-change subscription filter).
    #[must_use]
    pub fn iter_matching<'a>(&'a self, prefix: &'a str) -> ChangeIter<'a> {
        self.changes_iter(Some(prefix))
    }

    /// Iterate the change set the way subscriber callbacks consume it:
    /// optionally narrowed to an xpath prefix, one classified change at a
    /// time.
    #[must_use]
    pub fn changes_iter<'a>(&'a self, xpath: Option<&'a str>) -> ChangeIter<'a> {
        ChangeIter {
            changes: self.changes.iter(),
            prefix: xpath,
        }
    }

    /// Serialize for an event-ring payload.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::internal(format!("diff encode: {e}")))
    }

    /// Decode an event-ring payload.
    pub fn from_payload(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::RegionCorrupt {
            detail: format!("malformed diff payload: {e}"),
        })
    }
}

/// Iterator over a (possibly filtered) change set.
pub struct ChangeIter<'a> {
    changes: std::slice::Iter<'a, Change>,
    prefix: Option<&'a str>,
}

impl<'a> Iterator for ChangeIter<'a> {
    type Item = &'a Change;

    fn next(&mut self) -> Option<&'a Change> {
        for change in self.changes.by_ref() {
            let hit = match self.prefix {
                None => true,
                Some(prefix) => {
                    change.xpath == prefix
                        || change
                            .xpath
                            .strip_prefix(prefix)
                            .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('['))
                }
            };
            if hit {
                return Some(change);
            }
        }
        None
    }
}

fn module_of(xpath: &str) -> Option<String> {
    let rest = xpath.strip_prefix('/')?;
    let head = rest.split(['/', '[']).next()?;
    head.split_once(':').map(|(m, _)| m.to_owned())
}

// ---------------------------------------------------------------------------
// compute_diff
// ---------------------------------------------------------------------------

/// Compare two trees and produce the classified change set.
///
/// The schema context supplies user-ordered flags for move detection;
/// nodes without schema backing fall back to unordered comparison.
#[must_use]
pub fn compute_diff(old: &DataTree, new: &DataTree, ctx: &SchemaContext) -> Diff {
    let mut diff = Diff::default();
    let old_refs: Vec<&DataNode> = old.roots.iter().collect();
    let new_refs: Vec<&DataNode> = new.roots.iter().collect();
    diff_siblings(&old_refs, &new_refs, None, ctx, "", true, &mut diff.changes);
    diff
}

#[allow(clippy::too_many_arguments)]
fn diff_siblings(
    old: &[&DataNode],
    new: &[&DataNode],
    parent_schema: Option<&SchemaNode>,
    ctx: &SchemaContext,
    prefix: &str,
    top: bool,
    out: &mut Vec<Change>,
) {
    // Deletes first, child-before-parent, so replay never orphans data.
    for o in old {
        if !new.iter().any(|n| n.same_instance(o)) {
            emit_delete(o, prefix, top, out);
        }
    }

    for n in new {
        let path = node_path(n, prefix, top);
        match old.iter().find(|o| o.same_instance(n)) {
            None => emit_create(n, prefix, top, out),
            Some(o) => {
                if !n.value.is_structural() && o.value != n.value {
                    out.push(Change {
                        xpath: path.clone(),
                        op: ChangeOperation::Modified,
                        old_value: Some(o.value.clone()),
                        new_value: Some(n.value.clone()),
                        anchor: None,
                    });
                }
                let schema = find_schema(parent_schema, ctx, n, top);
                let old_children: Vec<&DataNode> = o.children.iter().collect();
                let new_children: Vec<&DataNode> = n.children.iter().collect();
                diff_siblings(
                    &old_children,
                    &new_children,
                    schema,
                    ctx,
                    &path,
                    false,
                    out,
                );
            }
        }
    }

    detect_moves(old, new, parent_schema, ctx, prefix, top, out);
}

/// Flag user-ordered instances whose relative order changed.
#[allow(clippy::too_many_arguments)]
fn detect_moves(
    old: &[&DataNode],
    new: &[&DataNode],
    parent_schema: Option<&SchemaNode>,
    ctx: &SchemaContext,
    prefix: &str,
    top: bool,
    out: &mut Vec<Change>,
) {
    // Group names present in the new tree, first occurrence order.
    let mut names: Vec<&str> = Vec::new();
    for n in new {
        if !names.contains(&n.name.as_str()) {
            names.push(&n.name);
        }
    }

    for name in names {
        let Some(representative) = new.iter().find(|n| n.name == name) else {
            continue;
        };
        let schema = find_schema(parent_schema, ctx, representative, top);
        let user_ordered = matches!(
            schema.map(|s| &s.kind),
            Some(
                SchemaNodeKind::List { user_ordered: true, .. }
                    | SchemaNodeKind::LeafList { user_ordered: true, .. }
            )
        );
        if !user_ordered {
            continue;
        }

        // Instances present in both trees, in each tree's order.
        let old_common: Vec<&DataNode> = old
            .iter()
            .filter(|o| o.name == name && new.iter().any(|n| n.same_instance(o)))
            .copied()
            .collect();
        let new_common: Vec<&DataNode> = new
            .iter()
            .filter(|n| n.name == name && old.iter().any(|o| o.same_instance(n)))
            .copied()
            .collect();

        // Map each surviving instance to its position in the old order;
        // instances on a longest increasing subsequence kept their
        // relative order, everything else moved.
        let old_pos: Vec<usize> = new_common
            .iter()
            .map(|n| {
                old_common
                    .iter()
                    .position(|o| n.same_instance(o))
                    .expect("new_common only holds instances present in old")
            })
            .collect();
        let kept = longest_increasing_subsequence(&old_pos);
        for (i, n) in new_common.iter().enumerate() {
            if kept.contains(&i) {
                continue;
            }
            let anchor = if i == 0 {
                None
            } else {
                Some(new_common[i - 1].segment())
            };
            out.push(Change {
                xpath: node_path(n, prefix, top),
                op: ChangeOperation::Moved,
                old_value: None,
                new_value: None,
                anchor,
            });
        }
    }
}

/// Indices of one longest strictly-increasing subsequence of `values`.
///
/// O(n²); sibling groups are small. Deterministic: the subsequence end and
/// each predecessor pick the rightmost candidate, so later elements win
/// ties and the flagged (moved) set is stable.
fn longest_increasing_subsequence(values: &[usize]) -> Vec<usize> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len();
    let mut len = vec![1_usize; n];
    for i in 0..n {
        for j in 0..i {
            if values[j] < values[i] && len[j] + 1 > len[i] {
                len[i] = len[j] + 1;
            }
        }
    }
    let best = *len.iter().max().expect("nonempty");
    let mut end = n
        - 1
        - len
            .iter()
            .rev()
            .position(|&l| l == best)
            .expect("max exists");
    let mut out = vec![end];
    let mut need = best - 1;
    while need > 0 {
        let mut j = end;
        loop {
            j -= 1;
            if len[j] == need && values[j] < values[end] {
                out.push(j);
                end = j;
                need -= 1;
                break;
            }
        }
    }
    out.reverse();
    out
}

fn find_schema<'a>(
    parent: Option<&'a SchemaNode>,
    ctx: &'a SchemaContext,
    node: &DataNode,
    top: bool,
) -> Option<&'a SchemaNode> {
    if top {
        ctx.module(&node.module)
            .ok()
            .and_then(|m| m.top_node(&node.name))
    } else {
        parent.and_then(|p| p.children.iter().find(|c| c.name == node.name))
    }
}

fn emit_create(node: &DataNode, prefix: &str, top: bool, out: &mut Vec<Change>) {
    let path = node_path(node, prefix, top);
    out.push(Change {
        xpath: path.clone(),
        op: ChangeOperation::Created,
        old_value: None,
        new_value: Some(node.value.clone()),
        anchor: None,
    });
    for child in &node.children {
        emit_create(child, &path, false, out);
    }
}

fn emit_delete(node: &DataNode, prefix: &str, top: bool, out: &mut Vec<Change>) {
    let path = node_path(node, prefix, top);
    for child in &node.children {
        emit_delete(child, &path, false, out);
    }
    out.push(Change {
        xpath: path,
        op: ChangeOperation::Deleted,
        old_value: Some(node.value.clone()),
        new_value: None,
        anchor: None,
    });
}

fn node_path(node: &DataNode, prefix: &str, top: bool) -> String {
    if top {
        format!("{prefix}/{}:{}", node.module, node.segment())
    } else {
        format!("{prefix}/{}", node.segment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ystore_tree::{Path, SchemaModule};
    use ystore_types::{Generation, ValueKind};

    fn ctx() -> SchemaContext {
        let mut ctx = SchemaContext::new(Generation::FIRST);
        ctx.insert_module(SchemaModule::new(
            "m",
            vec![ystore_tree::SchemaNode::container(
                "cont",
                vec![
                    ystore_tree::SchemaNode::leaf("leaf", ValueKind::String),
                    ystore_tree::SchemaNode::list(
                        "l",
                        vec!["k".to_owned()],
                        vec![
                            ystore_tree::SchemaNode::leaf("k", ValueKind::String),
                            ystore_tree::SchemaNode::leaf("v", ValueKind::Int32),
                        ],
                    ),
                    ystore_tree::SchemaNode::leaf_list("ll", ValueKind::String).user_ordered(),
                ],
            )],
        ));
        ctx
    }

    fn tree_with(leaf: &str, list: &[(&str, i32)], ll: &[&str]) -> DataTree {
        let mut cont = DataNode::new("m", "cont", Value::Container);
        cont.children
            .push(DataNode::new("m", "leaf", Value::String(leaf.to_owned())));
        for (k, v) in list {
            let mut inst =
                DataNode::list_instance("m", "l", vec![("k".to_owned(), (*k).to_owned())]);
            inst.children
                .push(DataNode::new("m", "v", Value::Int32(*v)));
            cont.children.push(inst);
        }
        for v in ll {
            cont.children.push(
                DataNode::new("m", "ll", Value::String((*v).to_owned()))
                    .as_leaf_list_instance(),
            );
        }
        DataTree { roots: vec![cont] }
    }

    #[test]
    fn identical_trees_produce_empty_diff() {
        let t = tree_with("x", &[("a", 1)], &["p"]);
        assert!(compute_diff(&t, &t, &ctx()).is_empty());
    }

    #[test]
    fn modify_classification() {
        let old = tree_with("x", &[], &[]);
        let new = tree_with("y", &[], &[]);
        let diff = compute_diff(&old, &new, &ctx());
        assert_eq!(diff.changes.len(), 1);
        let c = &diff.changes[0];
        assert_eq!(c.op, ChangeOperation::Modified);
        assert_eq!(c.xpath, "/m:cont/leaf");
        assert_eq!(c.old_value, Some(Value::String("x".to_owned())));
        assert_eq!(c.new_value, Some(Value::String("y".to_owned())));
    }

    #[test]
    fn create_emits_parent_before_child() {
        let old = tree_with("x", &[], &[]);
        let new = tree_with("x", &[("a", 1)], &[]);
        let diff = compute_diff(&old, &new, &ctx());
        let ops: Vec<(&str, ChangeOperation)> = diff
            .changes
            .iter()
            .map(|c| (c.xpath.as_str(), c.op))
            .collect();
        assert_eq!(
            ops,
            vec![
                ("/m:cont/l[k='a']", ChangeOperation::Created),
                ("/m:cont/l[k='a']/k", ChangeOperation::Created),
                ("/m:cont/l[k='a']/v", ChangeOperation::Created),
            ]
        );
    }

    #[test]
    fn delete_emits_child_before_parent() {
        let old = tree_with("x", &[("a", 1)], &[]);
        let new = tree_with("x", &[], &[]);
        let diff = compute_diff(&old, &new, &ctx());
        let paths: Vec<&str> = diff.changes.iter().map(|c| c.xpath.as_str()).collect();
        let inst = paths
            .iter()
            .position(|p| *p == "/m:cont/l[k='a']")
            .unwrap();
        let child = paths
            .iter()
            .position(|p| *p == "/m:cont/l[k='a']/v")
            .unwrap();
        assert!(child < inst, "child delete must precede parent delete");
        assert!(diff
            .changes
            .iter()
            .all(|c| c.op == ChangeOperation::Deleted));
    }

    #[test]
    fn user_ordered_reorder_is_moved() {
        let old = tree_with("x", &[], &["a", "b", "c"]);
        let new = tree_with("x", &[], &["b", "c", "a"]);
        let diff = compute_diff(&old, &new, &ctx());
        assert_eq!(diff.changes.len(), 1);
        let c = &diff.changes[0];
        assert_eq!(c.op, ChangeOperation::Moved);
        assert_eq!(c.xpath, "/m:cont/ll[.='a']");
        assert_eq!(c.anchor.as_deref(), Some("ll[.='c']"));
    }

    #[test]
    fn moved_to_first_has_no_anchor() {
        let old = tree_with("x", &[], &["a", "b"]);
        let new = tree_with("x", &[], &["b", "a"]);
        let diff = compute_diff(&old, &new, &ctx());
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].xpath, "/m:cont/ll[.='b']");
        assert_eq!(diff.changes[0].anchor, None);
    }

    #[test]
    fn non_user_ordered_reorder_is_silent() {
        let old = tree_with("x", &[("a", 1), ("b", 2)], &[]);
        let mut new = tree_with("x", &[("b", 2), ("a", 1)], &[]);
        // Same content, different list order; `l` is not user-ordered.
        let diff = compute_diff(&old, &new, &ctx());
        assert!(diff.is_empty(), "got {:?}", diff.changes);
        // Sanity: the trees really differ in order.
        let p = Path::parse("/m:cont/l").unwrap();
        assert_ne!(old.find(&p)[0].keys, new.find(&p)[0].keys);
        new.roots.clear();
    }

    #[test]
    fn split_by_module_and_filter() {
        let old = tree_with("x", &[], &[]);
        let new = tree_with("y", &[("a", 1)], &[]);
        let diff = compute_diff(&old, &new, &ctx());
        let per_module = diff.split_by_module();
        assert_eq!(per_module.len(), 1);
        assert!(per_module.contains_key("m"));

        let under_list: Vec<&Change> = diff.iter_matching("/m:cont/l[k='a']").collect();
        assert_eq!(under_list.len(), 3);
        // Prefix filtering does not match partial segment names.
        assert_eq!(diff.iter_matching("/m:cont/le").count(), 0);
        assert_eq!(diff.iter_matching("/m:cont/leaf").count(), 1);
    }

    #[test]
    fn payload_roundtrip() {
        let old = tree_with("x", &[], &[]);
        let new = tree_with("y", &[], &[]);
        let diff = compute_diff(&old, &new, &ctx());
        let bytes = diff.to_payload().unwrap();
        assert_eq!(Diff::from_payload(&bytes).unwrap(), diff);
    }
}
