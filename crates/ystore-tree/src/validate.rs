//! Instance validation against the schema context.
//!
//! Validation collects every offending node into one error record instead
//! of stopping at the first failure; the caller gets the full picture in a
//! single *validation failed* result.
//!
//! Checks: unknown elements, value kinds, mandatory leaves, list and
//! leaf-list element bounds, list `unique` tuples, leafref targets, and
//! when-condition paths.

use std::collections::HashSet;

use tracing::debug;
use ystore_error::{ErrorEntry, Result, StoreError};

use crate::node::{DataNode, DataTree};
use crate::path::Path;
use crate::schema::{SchemaContext, SchemaModule, SchemaNode, SchemaNodeKind};

/// Validate every module that has data in the tree.
pub fn validate(tree: &DataTree, ctx: &SchemaContext) -> Result<()> {
    let mut entries = Vec::new();
    for module in tree.modules() {
        validate_module_into(tree, ctx, &module, &mut entries);
    }
    finish(entries)
}

/// Validate one module's subtree, including top-level mandatory and
/// min-elements constraints that bind even when the module has no data.
pub fn validate_module(tree: &DataTree, ctx: &SchemaContext, module: &str) -> Result<()> {
    let mut entries = Vec::new();
    validate_module_into(tree, ctx, module, &mut entries);
    finish(entries)
}

fn finish(entries: Vec<ErrorEntry>) -> Result<()> {
    if entries.is_empty() {
        Ok(())
    } else {
        debug!(count = entries.len(), "validation failed");
        Err(StoreError::validation(entries))
    }
}

fn validate_module_into(
    tree: &DataTree,
    ctx: &SchemaContext,
    module: &str,
    entries: &mut Vec<ErrorEntry>,
) {
    let Ok(schema) = ctx.module(module) else {
        entries.push(ErrorEntry::new(
            format!("data for uninstalled module \"{module}\""),
            None,
        ));
        return;
    };
    let roots: Vec<&DataNode> = tree.roots.iter().filter(|n| n.module == module).collect();
    let prefix = String::new();
    validate_level(
        tree,
        schema,
        &schema.nodes,
        &roots,
        &prefix,
        true,
        entries,
    );
}

/// Validate one sibling level: the data nodes under a common parent
/// against the parent's schema children.
#[allow(clippy::too_many_arguments)]
fn validate_level(
    tree: &DataTree,
    module: &SchemaModule,
    schema_children: &[SchemaNode],
    data: &[&DataNode],
    prefix: &str,
    top: bool,
    entries: &mut Vec<ErrorEntry>,
) {
    // Per-node checks and recursion.
    for node in data {
        let path = node_path(node, prefix, top);
        let Some(schema) = active_child(module, schema_children, &node.name) else {
            entries.push(ErrorEntry::new(
                format!("unknown element \"{}\"", node.name),
                Some(path),
            ));
            continue;
        };

        if let Some(expected) = schema.leaf_value_kind() {
            if node.value.kind() != expected {
                entries.push(ErrorEntry::new(
                    format!(
                        "value kind {:?} does not match schema kind {expected:?}",
                        node.value.kind()
                    ),
                    Some(path.clone()),
                ));
            }
        }

        if let SchemaNodeKind::Leaf {
            leafref: Some(target),
            ..
        } = &schema.kind
        {
            check_leafref(tree, node, target, &path, entries);
        }

        if let Some(when) = &schema.when {
            check_when(tree, when, &path, entries);
        }

        let children: Vec<&DataNode> = node.children.iter().collect();
        validate_level(tree, module, &schema.children, &children, &path, false, entries);
    }

    // Presence-independent checks over the schema children of this level.
    for schema in schema_children {
        if !feature_active(module, schema) {
            continue;
        }
        match &schema.kind {
            SchemaNodeKind::Leaf { mandatory: true, .. } => {
                if !data.iter().any(|n| n.name == schema.name) {
                    entries.push(ErrorEntry::new(
                        format!("mandatory node \"{}\" is missing", schema.name),
                        Some(level_path(prefix, top, module, &schema.name)),
                    ));
                }
            }
            SchemaNodeKind::List {
                min_elements,
                max_elements,
                unique,
                keys,
                ..
            } => {
                let instances: Vec<&DataNode> = data
                    .iter()
                    .copied()
                    .filter(|n| n.name == schema.name)
                    .collect();
                check_bounds(
                    instances.len(),
                    *min_elements,
                    *max_elements,
                    &schema.name,
                    &level_path(prefix, top, module, &schema.name),
                    entries,
                );
                check_unique(&instances, unique, &schema.name, entries);
                check_duplicate_keys(&instances, keys, &schema.name, entries);
            }
            SchemaNodeKind::LeafList {
                min_elements,
                max_elements,
                ..
            } => {
                let count = data.iter().filter(|n| n.name == schema.name).count();
                check_bounds(
                    count,
                    *min_elements,
                    *max_elements,
                    &schema.name,
                    &level_path(prefix, top, module, &schema.name),
                    entries,
                );
            }
            _ => {}
        }
    }
}

fn active_child<'a>(
    module: &SchemaModule,
    children: &'a [SchemaNode],
    name: &str,
) -> Option<&'a SchemaNode> {
    children
        .iter()
        .find(|n| n.name == name && feature_active(module, n))
}

fn feature_active(module: &SchemaModule, node: &SchemaNode) -> bool {
    node.if_feature
        .as_deref()
        .map_or(true, |f| module.feature_enabled(f))
}

fn node_path(node: &DataNode, prefix: &str, top: bool) -> String {
    if top {
        format!("{prefix}/{}:{}", node.module, node.segment())
    } else {
        format!("{prefix}/{}", node.segment())
    }
}

fn level_path(prefix: &str, top: bool, module: &SchemaModule, name: &str) -> String {
    if top {
        format!("{prefix}/{}:{name}", module.name)
    } else {
        format!("{prefix}/{name}")
    }
}

fn check_bounds(
    count: usize,
    min: u32,
    max: Option<u32>,
    name: &str,
    path: &str,
    entries: &mut Vec<ErrorEntry>,
) {
    if count < min as usize {
        entries.push(ErrorEntry::new(
            format!("too few \"{name}\" elements: {count} < {min}"),
            Some(path.to_owned()),
        ));
    }
    if let Some(max) = max {
        if count > max as usize {
            entries.push(ErrorEntry::new(
                format!("too many \"{name}\" elements: {count} > {max}"),
                Some(path.to_owned()),
            ));
        }
    }
}

fn check_unique(
    instances: &[&DataNode],
    unique: &[Vec<String>],
    list_name: &str,
    entries: &mut Vec<ErrorEntry>,
) {
    for tuple in unique {
        let mut seen: HashSet<Vec<Option<String>>> = HashSet::new();
        for inst in instances {
            let values: Vec<Option<String>> = tuple
                .iter()
                .map(|leaf| {
                    inst.children
                        .iter()
                        .find(|c| &c.name == leaf)
                        .map(|c| c.value.canonical())
                })
                .collect();
            // Instances missing any tuple leaf do not participate.
            if values.iter().any(Option::is_none) {
                continue;
            }
            if !seen.insert(values) {
                entries.push(ErrorEntry::new(
                    format!(
                        "unique constraint ({}) violated on list \"{list_name}\"",
                        tuple.join(", ")
                    ),
                    None,
                ));
                break;
            }
        }
    }
}

fn check_duplicate_keys(
    instances: &[&DataNode],
    keys: &[String],
    list_name: &str,
    entries: &mut Vec<ErrorEntry>,
) {
    if keys.is_empty() {
        return;
    }
    let mut seen: HashSet<&[(String, String)]> = HashSet::new();
    for inst in instances {
        if !seen.insert(inst.keys.as_slice()) {
            entries.push(ErrorEntry::new(
                format!("duplicate key instance of list \"{list_name}\""),
                Some(inst.segment()),
            ));
        }
    }
}

fn check_leafref(
    tree: &DataTree,
    node: &DataNode,
    target: &str,
    path: &str,
    entries: &mut Vec<ErrorEntry>,
) {
    let Ok(target_path) = Path::parse(target) else {
        entries.push(ErrorEntry::new(
            format!("malformed leafref target \"{target}\""),
            Some(path.to_owned()),
        ));
        return;
    };
    let wanted = node.value.canonical();
    let found = tree
        .find(&target_path)
        .iter()
        .any(|t| t.value.canonical() == wanted);
    if !found {
        entries.push(ErrorEntry::new(
            format!("leafref value \"{wanted}\" has no target at \"{target}\""),
            Some(path.to_owned()),
        ));
    }
}

fn check_when(tree: &DataTree, when: &str, path: &str, entries: &mut Vec<ErrorEntry>) {
    let Ok(when_path) = Path::parse(when) else {
        entries.push(ErrorEntry::new(
            format!("malformed when path \"{when}\""),
            Some(path.to_owned()),
        ));
        return;
    };
    if tree.find(&when_path).is_empty() {
        entries.push(ErrorEntry::new(
            format!("when condition \"{when}\" is not satisfied"),
            Some(path.to_owned()),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ystore_types::{Generation, Value, ValueKind};

    fn ctx() -> SchemaContext {
        let mut ctx = SchemaContext::new(Generation::FIRST);
        ctx.insert_module(SchemaModule::new(
            "m",
            vec![
                SchemaNode::container(
                    "cont",
                    vec![
                        SchemaNode::leaf("must-have", ValueKind::String).mandatory(),
                        SchemaNode::leaf("num", ValueKind::Int32),
                        SchemaNode::list(
                            "servers",
                            vec!["name".to_owned()],
                            vec![
                                SchemaNode::leaf("name", ValueKind::String),
                                SchemaNode::leaf("port", ValueKind::Uint16),
                            ],
                        )
                        .with_elements(0, Some(2))
                        .with_unique(vec!["port".to_owned()]),
                    ],
                ),
                SchemaNode::leaf("the-ref", ValueKind::String)
                    .with_leafref("/m:cont/servers/name"),
            ],
        ));
        ctx
    }

    fn cont_with(children: Vec<DataNode>) -> DataTree {
        let mut cont = DataNode::new("m", "cont", Value::Container);
        cont.children = children;
        DataTree { roots: vec![cont] }
    }

    fn server(name: &str, port: u16) -> DataNode {
        let mut s = DataNode::list_instance(
            "m",
            "servers",
            vec![("name".to_owned(), name.to_owned())],
        );
        s.children
            .push(DataNode::new("m", "name", Value::String(name.to_owned())));
        s.children
            .push(DataNode::new("m", "port", Value::Uint16(port)));
        s
    }

    fn must_have() -> DataNode {
        DataNode::new("m", "must-have", Value::String("yes".to_owned()))
    }

    #[test]
    fn valid_tree_passes() {
        let tree = cont_with(vec![must_have(), server("a", 80), server("b", 443)]);
        validate(&tree, &ctx()).unwrap();
    }

    #[test]
    fn missing_mandatory_is_collected() {
        let tree = cont_with(vec![server("a", 80)]);
        let err = validate(&tree, &ctx()).unwrap_err();
        let StoreError::ValidationFailed { entries } = err else {
            panic!("expected validation failure");
        };
        assert!(entries
            .iter()
            .any(|e| e.message.contains("mandatory node \"must-have\"")));
    }

    #[test]
    fn collects_multiple_failures() {
        // Missing mandatory leaf AND too many servers AND duplicate port.
        let tree = cont_with(vec![server("a", 80), server("b", 80), server("c", 81)]);
        let err = validate(&tree, &ctx()).unwrap_err();
        let StoreError::ValidationFailed { entries } = err else {
            panic!("expected validation failure");
        };
        assert!(entries.len() >= 3, "collected {entries:?}");
        assert!(entries.iter().any(|e| e.message.contains("mandatory")));
        assert!(entries.iter().any(|e| e.message.contains("too many")));
        assert!(entries.iter().any(|e| e.message.contains("unique")));
    }

    #[test]
    fn wrong_value_kind() {
        let tree = cont_with(vec![
            must_have(),
            DataNode::new("m", "num", Value::String("not a number".to_owned())),
        ]);
        let err = validate(&tree, &ctx()).unwrap_err();
        assert!(err.to_string().contains("does not match schema kind"));
    }

    #[test]
    fn unknown_element_reported() {
        let tree = cont_with(vec![must_have(), DataNode::new("m", "ghost", Value::Container)]);
        let err = validate(&tree, &ctx()).unwrap_err();
        assert!(err.to_string().contains("unknown element \"ghost\""));
    }

    #[test]
    fn leafref_requires_target() {
        let mut tree = cont_with(vec![must_have(), server("a", 80)]);
        tree.roots
            .push(DataNode::new("m", "the-ref", Value::String("a".to_owned())));
        validate(&tree, &ctx()).unwrap();

        let mut bad = cont_with(vec![must_have(), server("a", 80)]);
        bad.roots
            .push(DataNode::new("m", "the-ref", Value::String("zzz".to_owned())));
        let err = validate(&bad, &ctx()).unwrap_err();
        assert!(err.to_string().contains("leafref"));
    }

    #[test]
    fn duplicate_list_keys_rejected() {
        let tree = cont_with(vec![must_have(), server("a", 80), server("a", 81)]);
        let err = validate(&tree, &ctx()).unwrap_err();
        assert!(err.to_string().contains("duplicate key"));
    }

    #[test]
    fn empty_module_fails_only_explicit_validation() {
        let tree = DataTree::new();
        // Nothing to check when validating by tree content.
        validate(&tree, &ctx()).unwrap();
        // Explicit per-module validation enforces top-level constraints
        // (none at top level here, so it passes; `cont` is not a presence
        // container and its absence does not bind its descendants).
        validate_module(&tree, &ctx(), "m").unwrap();
    }
}
