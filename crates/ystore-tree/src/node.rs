//! The instance data tree.
//!
//! A [`DataTree`] holds ordered sibling lists of [`DataNode`]s. Node
//! identity is `(name, keys)` for list instances, `(name, value)` for
//! leaf-list instances, and plain `name` otherwise; identity drives path
//! matching, merging, and diffing. Sibling order is preserved everywhere
//! so user-ordered lists survive round trips.

use std::collections::BTreeSet;

use ystore_error::{Result, StoreError};
use ystore_types::Value;

use crate::path::{Path, PathSegment, Predicate};

// ---------------------------------------------------------------------------
// DataNode
// ---------------------------------------------------------------------------

/// One node of instance data.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DataNode {
    /// Owning module. Set on every node; top-level path segments render it.
    pub module: String,
    /// Schema node name.
    pub name: String,
    /// Typed value; structural for containers, lists, and notifications.
    pub value: Value,
    /// List instances: `(key name, canonical key value)` in schema order.
    pub keys: Vec<(String, String)>,
    /// Leaf-list instances carry their value as identity; a leaf and a
    /// leaf-list entry with equal values must still be distinguishable.
    #[serde(default)]
    pub is_leaf_list_instance: bool,
    /// Set when the value came from a schema default.
    pub default: bool,
    pub children: Vec<DataNode>,
}

impl DataNode {
    /// A new node with no children or keys.
    #[must_use]
    pub fn new(module: impl Into<String>, name: impl Into<String>, value: Value) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            value,
            keys: Vec::new(),
            is_leaf_list_instance: false,
            default: false,
            children: Vec::new(),
        }
    }

    /// A list instance with its key values.
    #[must_use]
    pub fn list_instance(
        module: impl Into<String>,
        name: impl Into<String>,
        keys: Vec<(String, String)>,
    ) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            value: Value::List,
            keys,
            is_leaf_list_instance: false,
            default: false,
            children: Vec::new(),
        }
    }

    /// Whether this node satisfies the segment's name and predicates.
    ///
    /// A segment without predicates matches every instance of the name, so
    /// predicate-less paths address whole lists and leaf-lists.
    #[must_use]
    pub fn matches(&self, seg: &PathSegment) -> bool {
        if self.name != seg.name {
            return false;
        }
        if let Some(m) = &seg.module {
            if *m != self.module {
                return false;
            }
        }
        seg.predicates.iter().all(|p| match p {
            Predicate::Key { name, value } => self
                .keys
                .iter()
                .any(|(kn, kv)| kn == name && kv == value),
            Predicate::Value(v) => self.value.canonical() == *v,
        })
    }

    /// Render this node as a path segment (keys and leaf-list values
    /// included), without a module prefix.
    #[must_use]
    pub fn segment(&self) -> String {
        let mut s = self.name.clone();
        if !self.keys.is_empty() {
            for (k, v) in &self.keys {
                s.push_str(&format!("[{k}='{v}']"));
            }
        } else if self.is_leaf_list_instance {
            s.push_str(&format!("[.='{}']", self.value.canonical()));
        }
        s
    }

    /// Two nodes are the same instance when name and identity predicates
    /// agree.
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

    /// Find the child matching `other`'s instance identity.
    #[must_use]
    pub fn child_like(&self, other: &Self) -> Option<&Self> {
        self.children.iter().find(|c| c.same_instance(other))
    }

    /// Mutable variant of [`DataNode::child_like`].
    pub fn child_like_mut(&mut self, other: &Self) -> Option<&mut Self> {
        self.children.iter_mut().find(|c| c.same_instance(other))
    }
}

impl DataNode {
    /// Mark this node as a leaf-list instance; its value becomes part of
    /// its identity.
    #[must_use]
    pub fn as_leaf_list_instance(mut self) -> Self {
        self.is_leaf_list_instance = true;
        self
    }
}

// ---------------------------------------------------------------------------
// DataTree
// ---------------------------------------------------------------------------

/// An ordered forest of instance data.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DataTree {
    pub roots: Vec<DataNode>,
}

impl DataTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// All nodes matching the path, in document order.
    #[must_use]
    pub fn find(&self, path: &Path) -> Vec<&DataNode> {
        let mut current: Vec<&DataNode> = self
            .roots
            .iter()
            .filter(|n| n.matches(&path.segments[0]))
            .collect();
        for seg in &path.segments[1..] {
            current = current
                .iter()
                .flat_map(|n| n.children.iter().filter(|c| c.matches(seg)))
                .collect();
        }
        current
    }

    /// Like [`DataTree::find`], but paired with each node's absolute
    /// canonical path.
    #[must_use]
    pub fn find_with_paths(&self, path: &Path) -> Vec<(String, &DataNode)> {
        fn descend<'a>(
            nodes: &'a [DataNode],
            segs: &[PathSegment],
            prefix: &str,
            top: bool,
            out: &mut Vec<(String, &'a DataNode)>,
        ) {
            let Some((seg, rest)) = segs.split_first() else {
                return;
            };
            for node in nodes.iter().filter(|n| n.matches(seg)) {
                let rendered = if top {
                    format!("{prefix}/{}:{}", node.module, node.segment())
                } else {
                    format!("{prefix}/{}", node.segment())
                };
                if rest.is_empty() {
                    out.push((rendered, node));
                } else {
                    descend(&node.children, rest, &rendered, false, out);
                }
            }
        }
        let mut out = Vec::new();
        descend(&self.roots, &path.segments, "", true, &mut out);
        out
    }

    /// Exactly one node at the path: *not found* for zero matches,
    /// *invalid argument* for more than one.
    pub fn get(&self, path: &Path) -> Result<&DataNode> {
        let mut matches = self.find(path);
        match matches.len() {
            0 => Err(StoreError::not_found(path.to_string())),
            1 => Ok(matches.remove(0)),
            n => Err(StoreError::invalid_arg(format!(
                "path \"{path}\" matches {n} nodes; a unique match is required"
            ))),
        }
    }

    /// The first node matching the path, mutably.
    pub fn get_mut(&mut self, path: &Path) -> Option<&mut DataNode> {
        fn descend<'a>(
            nodes: &'a mut [DataNode],
            segs: &[PathSegment],
        ) -> Option<&'a mut DataNode> {
            let (seg, rest) = segs.split_first()?;
            let node = nodes.iter_mut().find(|n| n.matches(seg))?;
            if rest.is_empty() {
                Some(node)
            } else {
                descend(&mut node.children, rest)
            }
        }
        descend(&mut self.roots, &path.segments)
    }

    /// Remove every node matching the path. Returns how many instances
    /// were removed (a keyless or predicate-less list path removes all).
    pub fn remove(&mut self, path: &Path) -> usize {
        fn remove_in(nodes: &mut Vec<DataNode>, segs: &[PathSegment]) -> usize {
            let (seg, rest) = match segs.split_first() {
                Some(v) => v,
                None => return 0,
            };
            if rest.is_empty() {
                let before = nodes.len();
                nodes.retain(|n| !n.matches(seg));
                return before - nodes.len();
            }
            nodes
                .iter_mut()
                .filter(|n| n.matches(seg))
                .map(|n| remove_in(&mut n.children, rest))
                .sum()
        }
        remove_in(&mut self.roots, &path.segments)
    }

    /// Merge `other` into `self`: nodes with the same instance identity
    /// are overwritten in place (value and default flag), new instances
    /// are appended after their existing siblings.
    pub fn merge(&mut self, other: &DataTree) {
        fn merge_children(dst: &mut Vec<DataNode>, src: &[DataNode]) {
            for node in src {
                if let Some(existing) = dst.iter_mut().find(|d| d.same_instance(node)) {
                    existing.value = node.value.clone();
                    existing.default = node.default;
                    merge_children(&mut existing.children, &node.children);
                } else {
                    dst.push(node.clone());
                }
            }
        }
        merge_children(&mut self.roots, &other.roots);
    }

    /// Visit every node depth-first with its absolute path.
    pub fn walk(&self, f: &mut impl FnMut(&str, &DataNode)) {
        fn visit(node: &DataNode, prefix: &str, top: bool, f: &mut impl FnMut(&str, &DataNode)) {
            let seg = node.segment();
            let path = if top {
                format!("{prefix}/{}:{seg}", node.module)
            } else {
                format!("{prefix}/{seg}")
            };
            f(&path, node);
            for child in &node.children {
                visit(child, &path, false, f);
            }
        }
        for root in &self.roots {
            visit(root, "", true, f);
        }
    }

    /// Module names present in the tree, sorted.
    #[must_use]
    pub fn modules(&self) -> BTreeSet<String> {
        self.roots.iter().map(|n| n.module.clone()).collect()
    }

    /// A deep copy containing only `module`'s subtrees.
    #[must_use]
    pub fn filter_module(&self, module: &str) -> DataTree {
        DataTree {
            roots: self
                .roots
                .iter()
                .filter(|n| n.module == module)
                .cloned()
                .collect(),
        }
    }

    /// Replace `module`'s subtrees with those from `replacement`.
    pub fn replace_module(&mut self, module: &str, replacement: &DataTree) {
        self.roots.retain(|n| n.module != module);
        self.roots
            .extend(replacement.roots.iter().filter(|n| n.module == module).cloned());
    }

    /// Serialize to the JSON interchange form.
    pub fn serialize(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| StoreError::SchemaLibrary {
            detail: format!("tree serialization failed: {e}"),
        })
    }

    /// Parse the JSON interchange form produced by [`DataTree::serialize`].
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| StoreError::SchemaLibrary {
            detail: format!("tree parse failed: {e}"),
        })
    }
}
