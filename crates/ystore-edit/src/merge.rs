//! Merging a staged edit over a stored tree.
//!
//! Produces the candidate result tree for validation and diffing; the
//! stored tree itself is never mutated. Operation semantics are
//! edit-config: `merge` creates what is missing, `create` refuses an
//! existing target, `delete` requires one, `remove` tolerates absence,
//! `replace` swaps the whole subtree.

use ystore_error::{Result, StoreError};
use ystore_tree::{DataNode, DataTree, Path};
use ystore_types::MovePosition;

use crate::edit::{EditNode, EditOp, MoveOp, SessionEdit};

/// Apply `edit` over `reference`, returning the merged result.
pub fn apply_edit(reference: &DataTree, edit: &SessionEdit) -> Result<DataTree> {
    let mut result = reference.clone();
    for enode in &edit.roots {
        apply_node(&mut result.roots, enode, EditOp::Merge, "", true)?;
    }
    for mv in &edit.moves {
        apply_move(&mut result, mv)?;
    }
    Ok(result)
}

fn apply_node(
    siblings: &mut Vec<DataNode>,
    enode: &EditNode,
    inherited: EditOp,
    prefix: &str,
    top: bool,
) -> Result<()> {
    let op = enode.op.unwrap_or(inherited);
    let path = node_path(enode, prefix, top);

    if op.is_removal() {
        let before = siblings.len();
        siblings.retain(|d| !removal_matches(d, enode));
        let removed = before - siblings.len();
        if removed == 0 && op == EditOp::Delete {
            return Err(StoreError::not_found(path));
        }
        return Ok(());
    }

    let existing = siblings.iter_mut().position(|d| instance_matches(d, enode));
    match (op, existing) {
        (EditOp::Create, Some(_)) => Err(StoreError::exists(path)),
        (EditOp::Replace, maybe) => {
            if let Some(i) = maybe {
                siblings.remove(i);
            }
            siblings.push(to_data(enode));
            Ok(())
        }
        (EditOp::Create | EditOp::Merge, None) => {
            if parents_required_below(enode) {
                // A NON_RECURSIVE target sits below this missing node;
                // synthesizing it would violate the staging contract.
                return Err(StoreError::not_found(format!(
                    "parent \"{path}\" does not exist"
                )));
            }
            siblings.push(to_data(enode));
            Ok(())
        }
        (EditOp::Create | EditOp::Merge, Some(i)) => {
            let target = &mut siblings[i];
            if !enode.value.is_structural() {
                target.value = enode.value.clone();
                target.default = false;
            }
            for child in &enode.children {
                apply_node(&mut target.children, child, EditOp::Merge, &path, false)?;
            }
            Ok(())
        }
        (EditOp::Delete | EditOp::Remove, _) => unreachable!("removals handled above"),
    }
}

/// Whether any node in the subtree was staged `NON_RECURSIVE`.
fn parents_required_below(enode: &EditNode) -> bool {
    enode
        .children
        .iter()
        .any(|c| c.require_parents || parents_required_below(c))
}

fn instance_matches(d: &DataNode, e: &EditNode) -> bool {
    if d.name != e.name || d.module != e.module {
        return false;
    }
    if !d.keys.is_empty() || !e.keys.is_empty() {
        return d.keys == e.keys;
    }
    if d.is_leaf_list_instance || e.is_leaf_list_instance {
        return d.value == e.value;
    }
    true
}

/// Removal matching is looser than instance matching: a removal staged
/// without predicates takes every instance of the name.
fn removal_matches(d: &DataNode, e: &EditNode) -> bool {
    if d.name != e.name || d.module != e.module {
        return false;
    }
    if !e.keys.is_empty() {
        return d.keys == e.keys;
    }
    if e.is_leaf_list_instance {
        return d.value == e.value;
    }
    true
}

fn to_data(enode: &EditNode) -> DataNode {
    let mut node = DataNode::new(enode.module.clone(), enode.name.clone(), enode.value.clone());
    node.keys = enode.keys.clone();
    node.is_leaf_list_instance = enode.is_leaf_list_instance;
    node.children = enode
        .children
        .iter()
        .filter(|c| !c.op.unwrap_or(EditOp::Merge).is_removal())
        .map(to_data)
        .collect();
    node
}

fn node_path(enode: &EditNode, prefix: &str, top: bool) -> String {
    let mut seg = enode.name.clone();
    for (k, v) in &enode.keys {
        seg.push_str(&format!("[{k}='{v}']"));
    }
    if enode.is_leaf_list_instance && enode.keys.is_empty() {
        seg.push_str(&format!("[.='{}']", enode.value.canonical()));
    }
    if top {
        format!("{prefix}/{}:{seg}", enode.module)
    } else {
        format!("{prefix}/{seg}")
    }
}

// ---------------------------------------------------------------------------
// Moves
// ---------------------------------------------------------------------------

fn apply_move(tree: &mut DataTree, mv: &MoveOp) -> Result<()> {
    let path = Path::parse(&mv.xpath)?;
    let siblings = match path.parent() {
        Some(parent) => {
            let parent_node = tree
                .get_mut(&parent)
                .ok_or_else(|| StoreError::not_found(parent.to_string()))?;
            &mut parent_node.children
        }
        None => &mut tree.roots,
    };
    reorder(siblings, &path, mv)
}

fn reorder(siblings: &mut Vec<DataNode>, path: &Path, mv: &MoveOp) -> Result<()> {
    let seg = path.last();
    // Work within the group of same-name siblings; other names keep their
    // slots so unrelated order is untouched.
    let group: Vec<usize> = siblings
        .iter()
        .enumerate()
        .filter(|(_, n)| n.name == seg.name)
        .map(|(i, _)| i)
        .collect();
    let target_in_group = group
        .iter()
        .position(|&i| siblings[i].matches(seg))
        .ok_or_else(|| StoreError::not_found(mv.xpath.clone()))?;

    let mut order: Vec<usize> = group.clone();
    let target_idx = order.remove(target_in_group);

    let insert_at = match mv.position {
        MovePosition::First => 0,
        MovePosition::Last => order.len(),
        MovePosition::Before | MovePosition::After => {
            let anchor = mv.anchor.as_deref().ok_or_else(|| {
                StoreError::invalid_arg(format!("move {} requires an anchor", mv.position))
            })?;
            let pos = order
                .iter()
                .position(|&i| anchor_matches(&siblings[i], anchor))
                .ok_or_else(|| {
                    StoreError::not_found(format!(
                        "move anchor \"{anchor}\" among \"{}\" siblings",
                        seg.name
                    ))
                })?;
            if mv.position == MovePosition::Before {
                pos
            } else {
                pos + 1
            }
        }
    };
    order.insert(insert_at, target_idx);

    // Write the new order back into the group's original slots.
    let reordered: Vec<DataNode> = order.iter().map(|&i| siblings[i].clone()).collect();
    for (slot, node) in group.into_iter().zip(reordered) {
        siblings[slot] = node;
    }
    Ok(())
}

/// An anchor is the key-predicate string of a list instance or the value
/// of a leaf-list entry.
fn anchor_matches(node: &DataNode, anchor: &str) -> bool {
    if !node.keys.is_empty() {
        let rendered: String = node
            .keys
            .iter()
            .map(|(k, v)| format!("[{k}='{v}']"))
            .collect();
        rendered == anchor
    } else {
        node.value.canonical() == anchor
    }
}
