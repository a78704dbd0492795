//! RPC dispatch.
//!
//! `rpc_send` is synchronous: input is schema-validated, the single
//! highest-priority subscriber runs, and its output is schema-validated
//! before it returns to the caller. No subscriber means *not found*.

use tracing::debug;
use ystore_error::{ErrorEntry, Result, StoreError};
use ystore_tree::{DataTree, Path, SchemaContext, SchemaNode, SchemaNodeKind};

use crate::registry::{SubscriberKind, SubscriptionRegistry};

/// Dispatch one RPC.
pub fn dispatch_rpc(
    registry: &SubscriptionRegistry,
    ctx: &SchemaContext,
    xpath: &str,
    input: &DataTree,
) -> Result<DataTree> {
    let path = Path::parse(xpath)?;
    let rpc = ctx.find_rpc(&path)?;
    validate_io(rpc, input, xpath, true)?;

    let sub = registry
        .rpc_subscriber(xpath)
        .ok_or_else(|| StoreError::not_found(xpath))?;
    let SubscriberKind::Rpc(cb) = &sub.kind else {
        return Err(StoreError::internal("rpc subscription with non-rpc callback"));
    };
    debug!(xpath, priority = %sub.priority, "dispatching rpc");
    let output = cb(xpath, input)?;
    validate_io(rpc, &output, xpath, false)?;
    Ok(output)
}

/// Validate an input or output tree against the RPC's schema nodes.
///
/// The trees carry the RPC's children directly at their roots.
fn validate_io(rpc: &SchemaNode, tree: &DataTree, xpath: &str, input: bool) -> Result<()> {
    let SchemaNodeKind::Rpc { output } = &rpc.kind else {
        return Err(StoreError::internal("non-rpc schema node in rpc dispatch"));
    };
    let allowed: &[SchemaNode] = if input { &rpc.children } else { output };
    let mut entries = Vec::new();
    for node in &tree.roots {
        match allowed.iter().find(|s| s.name == node.name) {
            None => entries.push(ErrorEntry::new(
                format!(
                    "unknown {} node \"{}\" for rpc \"{xpath}\"",
                    if input { "input" } else { "output" },
                    node.name
                ),
                None,
            )),
            Some(schema) => {
                if let Some(kind) = schema.leaf_value_kind() {
                    if node.value.kind() != kind {
                        entries.push(ErrorEntry::new(
                            format!(
                                "value kind {:?} does not match schema kind {kind:?}",
                                node.value.kind()
                            ),
                            Some(format!("{xpath}/{}", node.name)),
                        ));
                    }
                }
            }
        }
    }
    if entries.is_empty() {
        Ok(())
    } else {
        Err(StoreError::validation(entries))
    }
}
