//! Session edit staging.
//!
//! A [`SessionEdit`] accumulates `set`/`delete`/`move`/`edit_batch` calls
//! as an operation-annotated tree. Nothing touches the datastore until the
//! edit is merged over the stored tree at validate/apply time; staging only
//! checks what can be checked against the schema and the edit itself.

use std::fmt;

use tracing::debug;
use ystore_error::{Result, StoreError};
use ystore_tree::{DataNode, Path, SchemaContext, SchemaNode, SchemaNodeKind};
use ystore_types::{EditOptions, MovePosition, Value};

// ---------------------------------------------------------------------------
// EditOp
// ---------------------------------------------------------------------------

/// Per-node operation of an edit tree, NETCONF edit-config style.
///
/// A node without its own operation inherits from its nearest annotated
/// ancestor, or from the batch default at the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EditOp {
    /// Merge with existing data, creating what is missing.
    Merge,
    /// Replace the whole subtree.
    Replace,
    /// Create; the target must not exist.
    Create,
    /// Delete; the target must exist.
    Delete,
    /// Remove if present; absence is not an error.
    Remove,
}

impl EditOp {
    /// Whether this operation removes data.
    #[must_use]
    pub const fn is_removal(self) -> bool {
        matches!(self, Self::Delete | Self::Remove)
    }
}

impl fmt::Display for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Merge => "merge",
            Self::Replace => "replace",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Remove => "remove",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// EditNode
// ---------------------------------------------------------------------------

/// One node of the staged edit tree.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EditNode {
    pub module: String,
    pub name: String,
    pub value: Value,
    pub keys: Vec<(String, String)>,
    #[serde(default)]
    pub is_leaf_list_instance: bool,
    /// `None` inherits the effective operation from the ancestor chain.
    pub op: Option<EditOp>,
    /// Parents of this node must already exist in the stored tree
    /// (`NON_RECURSIVE` staging); merge refuses to synthesize them.
    #[serde(default)]
    pub require_parents: bool,
    pub children: Vec<EditNode>,
}

impl EditNode {
    fn from_segment(module: &str, seg_name: &str, keys: Vec<(String, String)>, value: Value) -> Self {
        Self {
            module: module.to_owned(),
            name: seg_name.to_owned(),
            value,
            keys,
            is_leaf_list_instance: false,
            op: None,
            require_parents: false,
            children: Vec::new(),
        }
    }

    /// Convert a plain data node (and its subtree) into an edit node with
    /// no explicit operation.
    #[must_use]
    pub fn from_data(node: &DataNode) -> Self {
        Self {
            module: node.module.clone(),
            name: node.name.clone(),
            value: node.value.clone(),
            keys: node.keys.clone(),
            is_leaf_list_instance: node.is_leaf_list_instance,
            op: None,
            require_parents: false,
            children: node.children.iter().map(Self::from_data).collect(),
        }
    }

    /// Identity match against another edit node.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        if self.name != other.name || self.module != other.module {
            return false;
        }
        if !self.keys.is_empty() || !other.keys.is_empty() {
            return self.keys == other.keys;
        }
        if self.is_leaf_list_instance || other.is_leaf_list_instance {
            return self.value == other.value;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// MoveOp
// ---------------------------------------------------------------------------

/// A staged reorder of one user-ordered instance.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MoveOp {
    /// Path of the instance to move (with its identifying predicate).
    pub xpath: String,
    pub position: MovePosition,
    /// Sibling anchor for `before`/`after`: the key predicate string of a
    /// list instance (`[k='v']...`) or the value of a leaf-list entry.
    pub anchor: Option<String>,
}

// ---------------------------------------------------------------------------
// SessionEdit
// ---------------------------------------------------------------------------

/// The accumulated, not-yet-applied edit of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionEdit {
    pub roots: Vec<EditNode>,
    pub moves: Vec<MoveOp>,
}

impl SessionEdit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.moves.is_empty()
    }

    /// Drop everything staged.
    pub fn clear(&mut self) {
        self.roots.clear();
        self.moves.clear();
    }

    /// Stage a set. Missing parents are synthesized in the edit unless
    /// `NON_RECURSIVE`; `STRICT` stages a create and refuses a target
    /// already staged.
    pub fn set(
        &mut self,
        ctx: &SchemaContext,
        xpath: &str,
        value: Option<Value>,
        opts: EditOptions,
    ) -> Result<()> {
        let path = Path::parse(xpath)?;
        let schema = ctx.find_node(&path)?;
        let value = effective_value(schema, value, &path)?;

        let strict = opts.contains(EditOptions::STRICT);
        if strict && self.lookup(&path).is_some() {
            return Err(StoreError::exists(xpath));
        }

        let target = self.ensure_chain(ctx, &path)?;
        target.value = value;
        if matches!(schema.kind, SchemaNodeKind::LeafList { .. }) {
            target.is_leaf_list_instance = true;
        }
        target.op = Some(if strict { EditOp::Create } else { EditOp::Merge });
        target.require_parents = opts.contains(EditOptions::NON_RECURSIVE);
        debug!(xpath, strict, "staged set");
        Ok(())
    }

    /// Stage a delete. `STRICT` requires the target to exist at merge
    /// time; a predicate-less list path removes every instance.
    pub fn delete(&mut self, ctx: &SchemaContext, xpath: &str, opts: EditOptions) -> Result<()> {
        let path = Path::parse(xpath)?;
        ctx.find_node(&path)?;
        let target = self.ensure_chain(ctx, &path)?;
        target.op = Some(if opts.contains(EditOptions::STRICT) {
            EditOp::Delete
        } else {
            EditOp::Remove
        });
        // Anything previously staged below the target is now moot.
        target.children.clear();
        debug!(xpath, "staged delete");
        Ok(())
    }

    /// Stage a move of a user-ordered list or leaf-list instance.
    pub fn move_item(
        &mut self,
        ctx: &SchemaContext,
        xpath: &str,
        position: MovePosition,
        anchor: Option<&str>,
    ) -> Result<()> {
        let path = Path::parse(xpath)?;
        let schema = ctx.find_node(&path)?;
        let user_ordered = matches!(
            schema.kind,
            SchemaNodeKind::List { user_ordered: true, .. }
                | SchemaNodeKind::LeafList { user_ordered: true, .. }
        );
        if !user_ordered {
            return Err(StoreError::invalid_arg(format!(
                "\"{xpath}\" is not a user-ordered list or leaf-list"
            )));
        }
        if position.needs_anchor() && anchor.is_none() {
            return Err(StoreError::invalid_arg(format!(
                "move {position} requires a sibling anchor"
            )));
        }
        if !position.needs_anchor() && anchor.is_some() {
            return Err(StoreError::invalid_arg(format!(
                "move {position} does not take an anchor"
            )));
        }
        self.moves.push(MoveOp {
            xpath: path.to_string(),
            position,
            anchor: anchor.map(str::to_owned),
        });
        debug!(xpath, %position, "staged move");
        Ok(())
    }

    /// Merge an edit-config-style subtree into the staged edit. Nodes
    /// inherit `default_op` unless they carry their own operation.
    pub fn edit_batch(
        &mut self,
        ctx: &SchemaContext,
        batch: Vec<EditNode>,
        default_op: EditOp,
    ) -> Result<()> {
        for mut node in batch {
            // Validate each top-level entry addresses a known schema node.
            let path = Path::parse(&format!("/{}:{}", node.module, node.name))?;
            ctx.find_node(&path)?;
            if node.op.is_none() {
                node.op = Some(default_op);
            }
            merge_edit_node(&mut self.roots, node);
        }
        Ok(())
    }

    /// Find a staged node by path.
    #[must_use]
    pub fn lookup(&self, path: &Path) -> Option<&EditNode> {
        let mut nodes = &self.roots;
        let mut found = None;
        for seg in &path.segments {
            let node = nodes.iter().find(|n| {
                n.name == seg.name
                    && seg.module.as_deref().map_or(true, |m| m == n.module)
                    && seg.predicates.iter().all(|p| match p {
                        ystore_tree::Predicate::Key { name, value } => {
                            n.keys.iter().any(|(kn, kv)| kn == name && kv == value)
                        }
                        ystore_tree::Predicate::Value(v) => n.value.canonical() == *v,
                    })
            })?;
            nodes = &node.children;
            found = Some(node);
        }
        found
    }

    /// Walk the path, creating intermediate edit nodes as needed, and
    /// return the target node.
    fn ensure_chain(&mut self, ctx: &SchemaContext, path: &Path) -> Result<&mut EditNode> {
        let module = path.module().to_owned();
        let mut nodes = &mut self.roots;
        let mut prefix = Path {
            segments: smallvec::SmallVec::new(),
        };
        let last_idx = path.segments.len() - 1;
        for (i, seg) in path.segments.iter().enumerate() {
            prefix.segments.push(seg.clone());
            let pos = nodes.iter().position(|n| {
                n.name == seg.name
                    && seg.predicates.iter().all(|p| match p {
                        ystore_tree::Predicate::Key { name, value } => {
                            n.keys.iter().any(|(kn, kv)| kn == name && kv == value)
                        }
                        ystore_tree::Predicate::Value(v) => n.value.canonical() == *v,
                    })
            });
            let pos = match pos {
                Some(p) => p,
                None => {
                    let schema = ctx.find_node(&prefix)?;
                    let keys = seg
                        .key_values()
                        .into_iter()
                        .map(|(k, v)| (k.to_owned(), v.to_owned()))
                        .collect();
                    let mut fresh =
                        EditNode::from_segment(&module, &seg.name, keys, schema.structural_value());
                    if let Some(v) = seg.value_predicate() {
                        // Leaf-list addressed by value predicate.
                        if let Some(kind) = schema.leaf_value_kind() {
                            fresh.value = Value::parse_canonical(kind, v).ok_or_else(|| {
                                StoreError::invalid_arg(format!(
                                    "\"{v}\" is not a valid {kind:?} value"
                                ))
                            })?;
                            fresh.is_leaf_list_instance = true;
                        }
                    }
                    nodes.push(fresh);
                    nodes.len() - 1
                }
            };
            if i == last_idx {
                return Ok(&mut nodes[pos]);
            }
            nodes = &mut nodes[pos].children;
        }
        Err(StoreError::invalid_arg("empty path"))
    }
}

/// Merge one batch node into a sibling list, op-aware.
fn merge_edit_node(dst: &mut Vec<EditNode>, node: EditNode) {
    if let Some(existing) = dst.iter_mut().find(|d| d.same_instance(&node)) {
        existing.value = node.value;
        if node.op.is_some() {
            existing.op = node.op;
        }
        for child in node.children {
            merge_edit_node(&mut existing.children, child);
        }
    } else {
        dst.push(node);
    }
}

/// Resolve the value a staged set writes, checking it against the schema.
fn effective_value(schema: &SchemaNode, value: Option<Value>, path: &Path) -> Result<Value> {
    match (schema.leaf_value_kind(), value) {
        // Structural target (list instance, presence container): no value.
        (None, None) => Ok(schema.structural_value()),
        (None, Some(v)) if v.is_structural() => Ok(schema.structural_value()),
        (None, Some(_)) => Err(StoreError::invalid_arg(format!(
            "\"{path}\" is not a leaf; it cannot carry a value"
        ))),
        (Some(kind), Some(v)) => {
            if v.kind() == kind {
                Ok(v)
            } else {
                Err(StoreError::invalid_arg(format!(
                    "value kind {:?} does not match schema kind {kind:?} at \"{path}\"",
                    v.kind()
                )))
            }
        }
        // A leaf-list instance addressed purely by predicate.
        (Some(kind), None) => {
            if let Some(v) = path.last().value_predicate() {
                Value::parse_canonical(kind, v).ok_or_else(|| {
                    StoreError::invalid_arg(format!("\"{v}\" is not a valid {kind:?} value"))
                })
            } else if kind == ystore_types::ValueKind::LeafEmpty {
                Ok(Value::LeafEmpty)
            } else {
                Err(StoreError::invalid_arg(format!(
                    "a value is required to set leaf \"{path}\""
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ystore_types::{Generation, ValueKind};

    fn ctx() -> SchemaContext {
        let mut ctx = SchemaContext::new(Generation::FIRST);
        ctx.insert_module(ystore_tree::SchemaModule::new(
            "m",
            vec![
                ystore_tree::SchemaNode::container(
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
                        )
                        .user_ordered(),
                        ystore_tree::SchemaNode::leaf_list("ll", ValueKind::String).user_ordered(),
                    ],
                ),
                ystore_tree::SchemaNode::leaf("plain", ValueKind::Uint8),
            ],
        ));
        ctx
    }

    #[test]
    fn set_synthesizes_parents() {
        let mut edit = SessionEdit::new();
        edit.set(
            &ctx(),
            "/m:cont/l[k='a']/v",
            Some(Value::Int32(5)),
            EditOptions::DEFAULT,
        )
        .unwrap();
        let root = &edit.roots[0];
        assert_eq!(root.name, "cont");
        assert_eq!(root.children[0].name, "l");
        assert_eq!(root.children[0].keys, vec![("k".to_owned(), "a".to_owned())]);
        let leaf = &root.children[0].children[0];
        assert_eq!(leaf.op, Some(EditOp::Merge));
        assert_eq!(leaf.value, Value::Int32(5));
    }

    #[test]
    fn strict_set_twice_is_exists() {
        let mut edit = SessionEdit::new();
        edit.set(
            &ctx(),
            "/m:plain",
            Some(Value::Uint8(1)),
            EditOptions::STRICT,
        )
        .unwrap();
        let err = edit
            .set(
                &ctx(),
                "/m:plain",
                Some(Value::Uint8(2)),
                EditOptions::STRICT,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Exists { .. }));
    }

    #[test]
    fn set_checks_value_kind() {
        let mut edit = SessionEdit::new();
        let err = edit
            .set(
                &ctx(),
                "/m:plain",
                Some(Value::String("nope".to_owned())),
                EditOptions::DEFAULT,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn set_unknown_element_is_bad_element() {
        let mut edit = SessionEdit::new();
        let err = edit
            .set(&ctx(), "/m:nope", Some(Value::Bool(true)), EditOptions::DEFAULT)
            .unwrap_err();
        assert!(matches!(err, StoreError::BadElement { .. }));
    }

    #[test]
    fn leaf_list_set_by_predicate() {
        let mut edit = SessionEdit::new();
        edit.set(&ctx(), "/m:cont/ll[.='x']", None, EditOptions::DEFAULT)
            .unwrap();
        let ll = &edit.roots[0].children[0];
        assert!(ll.is_leaf_list_instance);
        assert_eq!(ll.value, Value::String("x".to_owned()));
    }

    #[test]
    fn delete_clears_staged_descendants() {
        let mut edit = SessionEdit::new();
        edit.set(
            &ctx(),
            "/m:cont/l[k='a']/v",
            Some(Value::Int32(5)),
            EditOptions::DEFAULT,
        )
        .unwrap();
        edit.delete(&ctx(), "/m:cont/l[k='a']", EditOptions::DEFAULT)
            .unwrap();
        let inst = &edit.roots[0].children[0];
        assert_eq!(inst.op, Some(EditOp::Remove));
        assert!(inst.children.is_empty());
    }

    #[test]
    fn move_validations() {
        let mut edit = SessionEdit::new();
        // Anchor-free positions reject anchors and vice versa.
        assert!(edit
            .move_item(&ctx(), "/m:cont/l[k='a']", MovePosition::First, Some("x"))
            .is_err());
        assert!(edit
            .move_item(&ctx(), "/m:cont/l[k='a']", MovePosition::Before, None)
            .is_err());
        edit.move_item(&ctx(), "/m:cont/l[k='a']", MovePosition::Last, None)
            .unwrap();
        // Non-user-ordered target is invalid.
        assert!(edit
            .move_item(&ctx(), "/m:plain", MovePosition::First, None)
            .is_err());
    }

    #[test]
    fn edit_batch_applies_default_op() {
        let mut edit = SessionEdit::new();
        let node = EditNode {
            module: "m".to_owned(),
            name: "plain".to_owned(),
            value: Value::Uint8(3),
            keys: vec![],
            is_leaf_list_instance: false,
            op: None,
            require_parents: false,
            children: vec![],
        };
        edit.edit_batch(&ctx(), vec![node], EditOp::Replace).unwrap();
        assert_eq!(edit.roots[0].op, Some(EditOp::Replace));
    }
}
