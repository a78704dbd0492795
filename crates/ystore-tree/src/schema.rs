//! Schema context: the compiled view of every installed module.
//!
//! The context is immutable per generation. Schema-affecting operations
//! build a whole new context and swap it in; live sessions keep the old
//! one alive until they drop their reference.

use std::collections::BTreeMap;
use std::sync::Arc;

use ystore_error::{Result, StoreError};
use ystore_types::{Generation, Value, ValueKind};

use crate::path::{Path, PathSegment};

// ---------------------------------------------------------------------------
// SchemaNode
// ---------------------------------------------------------------------------

/// Kind-specific schema properties of one node.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SchemaNodeKind {
    Container {
        /// Presence containers carry meaning by existing; non-presence
        /// containers are pure structure.
        presence: bool,
    },
    Leaf {
        value_kind: ValueKind,
        mandatory: bool,
        /// Canonical lexical form of the schema default, when defined.
        default: Option<String>,
        /// Absolute schema path whose instance values this leaf must
        /// reference.
        leafref: Option<String>,
    },
    LeafList {
        value_kind: ValueKind,
        user_ordered: bool,
        min_elements: u32,
        max_elements: Option<u32>,
    },
    List {
        /// Key leaf names in schema order. Empty for keyless lists.
        keys: Vec<String>,
        user_ordered: bool,
        min_elements: u32,
        max_elements: Option<u32>,
        /// Each entry is one `unique` constraint: a tuple of descendant
        /// leaf names whose combined values must be distinct per instance.
        unique: Vec<Vec<String>>,
    },
    /// An RPC; `children` hold the input nodes.
    Rpc {
        output: Vec<SchemaNode>,
    },
    /// A notification; `children` hold its content nodes.
    Notification,
}

/// One node of a module's schema tree.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SchemaNode {
    pub name: String,
    pub kind: SchemaNodeKind,
    /// Absolute data path that must have instances for this node to be
    /// valid (a restricted `when` condition).
    pub when: Option<String>,
    /// Feature name gating this node; the node only exists while the
    /// feature is enabled.
    pub if_feature: Option<String>,
    pub children: Vec<SchemaNode>,
}

impl SchemaNode {
    /// A non-presence container.
    #[must_use]
    pub fn container(name: impl Into<String>, children: Vec<SchemaNode>) -> Self {
        Self {
            name: name.into(),
            kind: SchemaNodeKind::Container { presence: false },
            when: None,
            if_feature: None,
            children,
        }
    }

    /// A presence container.
    #[must_use]
    pub fn presence_container(name: impl Into<String>, children: Vec<SchemaNode>) -> Self {
        Self {
            name: name.into(),
            kind: SchemaNodeKind::Container { presence: true },
            when: None,
            if_feature: None,
            children,
        }
    }

    /// An optional leaf of the given type.
    #[must_use]
    pub fn leaf(name: impl Into<String>, value_kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind: SchemaNodeKind::Leaf {
                value_kind,
                mandatory: false,
                default: None,
                leafref: None,
            },
            when: None,
            if_feature: None,
            children: Vec::new(),
        }
    }

    /// A leaf-list of the given type.
    #[must_use]
    pub fn leaf_list(name: impl Into<String>, value_kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind: SchemaNodeKind::LeafList {
                value_kind,
                user_ordered: false,
                min_elements: 0,
                max_elements: None,
            },
            when: None,
            if_feature: None,
            children: Vec::new(),
        }
    }

    /// A keyed list.
    #[must_use]
    pub fn list(
        name: impl Into<String>,
        keys: Vec<String>,
        children: Vec<SchemaNode>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: SchemaNodeKind::List {
                keys,
                user_ordered: false,
                min_elements: 0,
                max_elements: None,
                unique: Vec::new(),
            },
            when: None,
            if_feature: None,
            children,
        }
    }

    /// An RPC with input children and output nodes.
    #[must_use]
    pub fn rpc(
        name: impl Into<String>,
        input: Vec<SchemaNode>,
        output: Vec<SchemaNode>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: SchemaNodeKind::Rpc { output },
            when: None,
            if_feature: None,
            children: input,
        }
    }

    /// A notification with content children.
    #[must_use]
    pub fn notification(name: impl Into<String>, children: Vec<SchemaNode>) -> Self {
        Self {
            name: name.into(),
            kind: SchemaNodeKind::Notification,
            when: None,
            if_feature: None,
            children,
        }
    }

    /// Mark a leaf mandatory.
    #[must_use]
    pub fn mandatory(mut self) -> Self {
        if let SchemaNodeKind::Leaf { mandatory, .. } = &mut self.kind {
            *mandatory = true;
        }
        self
    }

    /// Set a leaf default (canonical lexical form).
    #[must_use]
    pub fn with_default(mut self, v: impl Into<String>) -> Self {
        if let SchemaNodeKind::Leaf { default, .. } = &mut self.kind {
            *default = Some(v.into());
        }
        self
    }

    /// Set a leafref target path on a leaf.
    #[must_use]
    pub fn with_leafref(mut self, target: impl Into<String>) -> Self {
        if let SchemaNodeKind::Leaf { leafref, .. } = &mut self.kind {
            *leafref = Some(target.into());
        }
        self
    }

    /// Make a list or leaf-list user-ordered.
    #[must_use]
    pub fn user_ordered(mut self) -> Self {
        match &mut self.kind {
            SchemaNodeKind::List { user_ordered, .. }
            | SchemaNodeKind::LeafList { user_ordered, .. } => *user_ordered = true,
            _ => {}
        }
        self
    }

    /// Set element count bounds on a list or leaf-list.
    #[must_use]
    pub fn with_elements(mut self, min: u32, max: Option<u32>) -> Self {
        match &mut self.kind {
            SchemaNodeKind::List {
                min_elements,
                max_elements,
                ..
            }
            | SchemaNodeKind::LeafList {
                min_elements,
                max_elements,
                ..
            } => {
                *min_elements = min;
                *max_elements = max;
            }
            _ => {}
        }
        self
    }

    /// Add a `unique` tuple to a list.
    #[must_use]
    pub fn with_unique(mut self, leaves: Vec<String>) -> Self {
        if let SchemaNodeKind::List { unique, .. } = &mut self.kind {
            unique.push(leaves);
        }
        self
    }

    /// Set the when-condition path.
    #[must_use]
    pub fn with_when(mut self, path: impl Into<String>) -> Self {
        self.when = Some(path.into());
        self
    }

    /// Gate this node behind a feature.
    #[must_use]
    pub fn with_if_feature(mut self, feature: impl Into<String>) -> Self {
        self.if_feature = Some(feature.into());
        self
    }

    /// Whether this node may carry child data nodes.
    #[must_use]
    pub const fn has_children(&self) -> bool {
        matches!(
            self.kind,
            SchemaNodeKind::Container { .. }
                | SchemaNodeKind::List { .. }
                | SchemaNodeKind::Rpc { .. }
                | SchemaNodeKind::Notification
        )
    }

    /// The value a data node instantiating this schema node carries when
    /// it has no explicit data.
    #[must_use]
    pub fn structural_value(&self) -> Value {
        match &self.kind {
            SchemaNodeKind::Container { presence: true } => Value::PresenceContainer,
            SchemaNodeKind::Container { presence: false } => Value::Container,
            SchemaNodeKind::List { .. } => Value::List,
            SchemaNodeKind::Notification => Value::Notification,
            SchemaNodeKind::Rpc { .. } => Value::Container,
            SchemaNodeKind::Leaf { value_kind, .. }
            | SchemaNodeKind::LeafList { value_kind, .. } => match value_kind {
                ValueKind::LeafEmpty => Value::LeafEmpty,
                _ => Value::Container,
            },
        }
    }

    /// The value kind a leaf or leaf-list expects; `None` for other kinds.
    #[must_use]
    pub const fn leaf_value_kind(&self) -> Option<ValueKind> {
        match &self.kind {
            SchemaNodeKind::Leaf { value_kind, .. }
            | SchemaNodeKind::LeafList { value_kind, .. } => Some(*value_kind),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SchemaModule
// ---------------------------------------------------------------------------

/// One installed module's compiled schema.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SchemaModule {
    pub name: String,
    pub revision: Option<String>,
    /// Every feature the module defines.
    pub features: Vec<String>,
    /// The subset of `features` currently enabled.
    pub enabled_features: Vec<String>,
    pub nodes: Vec<SchemaNode>,
}

impl SchemaModule {
    #[must_use]
    pub fn new(name: impl Into<String>, nodes: Vec<SchemaNode>) -> Self {
        Self {
            name: name.into(),
            revision: None,
            features: Vec::new(),
            enabled_features: Vec::new(),
            nodes,
        }
    }

    #[must_use]
    pub fn with_revision(mut self, rev: impl Into<String>) -> Self {
        self.revision = Some(rev.into());
        self
    }

    #[must_use]
    pub fn with_features(mut self, features: Vec<String>, enabled: Vec<String>) -> Self {
        self.features = features;
        self.enabled_features = enabled;
        self
    }

    /// Whether `feature` is currently enabled.
    #[must_use]
    pub fn feature_enabled(&self, feature: &str) -> bool {
        self.enabled_features.iter().any(|f| f == feature)
    }

    /// Find a top-level schema node by name, honoring feature gates.
    #[must_use]
    pub fn top_node(&self, name: &str) -> Option<&SchemaNode> {
        self.nodes
            .iter()
            .find(|n| n.name == name && self.node_active(n))
    }

    fn node_active(&self, node: &SchemaNode) -> bool {
        node.if_feature
            .as_deref()
            .map_or(true, |f| self.feature_enabled(f))
    }
}

// ---------------------------------------------------------------------------
// SchemaContext
// ---------------------------------------------------------------------------

/// The immutable compiled context for one generation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SchemaContext {
    pub generation: Generation,
    pub modules: BTreeMap<String, Arc<SchemaModule>>,
}

impl SchemaContext {
    #[must_use]
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            modules: BTreeMap::new(),
        }
    }

    /// Add or replace a module.
    pub fn insert_module(&mut self, module: SchemaModule) {
        self.modules.insert(module.name.clone(), Arc::new(module));
    }

    /// Look up a module; *unknown module* when absent.
    pub fn module(&self, name: &str) -> Result<&Arc<SchemaModule>> {
        self.modules
            .get(name)
            .ok_or_else(|| StoreError::unknown_module(name))
    }

    /// Module names in deterministic (lexicographic) order.
    #[must_use]
    pub fn module_names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    /// Resolve the schema node a parsed path addresses.
    ///
    /// *unknown module* when the prefix is not installed, *bad element*
    /// when any step does not exist in the module's schema (including
    /// nodes disabled by feature gates).
    pub fn find_node(&self, path: &Path) -> Result<&SchemaNode> {
        let module = self.module(path.module())?;
        let mut nodes = &module.nodes;
        let mut found: Option<&SchemaNode> = None;
        for seg in &path.segments {
            let node = nodes
                .iter()
                .find(|n| n.name == seg.name && self.seg_active(module, n))
                .ok_or_else(|| StoreError::BadElement {
                    module: module.name.clone(),
                    xpath: path.to_string(),
                })?;
            nodes = &node.children;
            found = Some(node);
        }
        found.ok_or_else(|| StoreError::invalid_arg("empty path"))
    }

    fn seg_active(&self, module: &SchemaModule, node: &SchemaNode) -> bool {
        node.if_feature
            .as_deref()
            .map_or(true, |f| module.feature_enabled(f))
    }

    /// Resolve an RPC schema node; *not found* when the path does not name
    /// an RPC.
    pub fn find_rpc(&self, path: &Path) -> Result<&SchemaNode> {
        let node = self.find_node(path)?;
        match node.kind {
            SchemaNodeKind::Rpc { .. } => Ok(node),
            _ => Err(StoreError::not_found(path.to_string())),
        }
    }

    /// Resolve a notification schema node.
    pub fn find_notification(&self, path: &Path) -> Result<&SchemaNode> {
        let node = self.find_node(path)?;
        match node.kind {
            SchemaNodeKind::Notification => Ok(node),
            _ => Err(StoreError::not_found(path.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_module() -> SchemaModule {
        SchemaModule::new(
            "test",
            vec![
                SchemaNode::container(
                    "cont",
                    vec![
                        SchemaNode::leaf("l", ValueKind::String),
                        SchemaNode::list(
                            "list",
                            vec!["k".to_owned()],
                            vec![
                                SchemaNode::leaf("k", ValueKind::String),
                                SchemaNode::leaf("v", ValueKind::Int32),
                            ],
                        ),
                    ],
                ),
                SchemaNode::leaf("gated", ValueKind::Bool).with_if_feature("extra"),
                SchemaNode::rpc(
                    "reset",
                    vec![SchemaNode::leaf("delay", ValueKind::Uint32)],
                    vec![SchemaNode::leaf("result", ValueKind::String)],
                ),
            ],
        )
        .with_features(vec!["extra".to_owned()], vec![])
    }

    fn ctx() -> SchemaContext {
        let mut ctx = SchemaContext::new(Generation::FIRST);
        ctx.insert_module(test_module());
        ctx
    }

    #[test]
    fn find_nested_node() {
        let ctx = ctx();
        let p = Path::parse("/test:cont/list[k='a']/v").unwrap();
        let node = ctx.find_node(&p).unwrap();
        assert_eq!(node.name, "v");
        assert_eq!(node.leaf_value_kind(), Some(ValueKind::Int32));
    }

    #[test]
    fn unknown_module_and_element() {
        let ctx = ctx();
        let p = Path::parse("/nope:cont").unwrap();
        assert!(matches!(
            ctx.find_node(&p),
            Err(StoreError::UnknownModule { .. })
        ));
        let p = Path::parse("/test:cont/missing").unwrap();
        assert!(matches!(
            ctx.find_node(&p),
            Err(StoreError::BadElement { .. })
        ));
    }

    #[test]
    fn feature_gated_node_is_invisible_until_enabled() {
        let mut ctx = ctx();
        let p = Path::parse("/test:gated").unwrap();
        assert!(ctx.find_node(&p).is_err());

        let mut m = test_module();
        m.enabled_features = vec!["extra".to_owned()];
        ctx.insert_module(m);
        assert!(ctx.find_node(&p).is_ok());
    }

    #[test]
    fn rpc_lookup() {
        let ctx = ctx();
        let p = Path::parse("/test:reset").unwrap();
        let rpc = ctx.find_rpc(&p).unwrap();
        assert!(matches!(rpc.kind, SchemaNodeKind::Rpc { .. }));
        // Input children resolve through the RPC node.
        let pin = Path::parse("/test:reset/delay").unwrap();
        assert_eq!(ctx.find_node(&pin).unwrap().name, "delay");
        // A non-RPC node is not an RPC.
        let pc = Path::parse("/test:cont").unwrap();
        assert!(ctx.find_rpc(&pc).is_err());
    }

    #[test]
    fn module_names_are_sorted() {
        let mut ctx = ctx();
        ctx.insert_module(SchemaModule::new("alpha", vec![]));
        assert_eq!(ctx.module_names(), vec!["alpha".to_owned(), "test".to_owned()]);
    }
}
