//! Operational datastore overlay.
//!
//! The operational view is never stored: it is `running`, narrowed to the
//! subtrees owned by live non-passive module-change subscribers, with
//! every operational provider's contribution merged on top at read time.

use tracing::warn;
use ystore_error::Result;
use ystore_tree::{DataTree, Path};

use crate::registry::{SubscriberKind, SubscriptionRegistry};

/// Assemble the operational view of one module.
pub fn build_operational(
    running: &DataTree,
    registry: &SubscriptionRegistry,
    module: &str,
) -> Result<DataTree> {
    let mut view = DataTree::new();

    // Configuration appears in the operational datastore only while an
    // owner (non-passive change subscriber) is alive for its subtree.
    let owned = registry.owned_prefixes(module);
    if owned.iter().any(Option::is_none) {
        view = running.filter_module(module);
    } else {
        for prefix in owned.into_iter().flatten() {
            if let Ok(path) = Path::parse(&prefix) {
                let module_tree = running.filter_module(module);
                let mut subtree = DataTree::new();
                for node in module_tree.find(&path) {
                    subtree.roots.push(rebuild_chain(&path, (*node).clone()));
                }
                view.merge(&subtree);
            }
        }
    }

    // Provider contributions overlay the configuration.
    for sub in registry.oper_providers(module) {
        let SubscriberKind::OperGet(cb) = &sub.kind else {
            continue;
        };
        let xpath = sub.xpath.as_deref().unwrap_or("");
        match cb(module, xpath) {
            Ok(contribution) => view.merge(&contribution),
            Err(e) => {
                // A failing provider degrades the view; it never fails the read.
                warn!(module, xpath, error = %e, "operational provider failed");
            }
        }
    }
    Ok(view)
}

/// Wrap a found subtree back under its ancestor chain so the merged view
/// keeps absolute structure.
fn rebuild_chain(path: &Path, node: ystore_tree::DataNode) -> ystore_tree::DataNode {
    // The found node corresponds to the last segment; ancestors are
    // synthesized as bare containers.
    let mut current = node;
    for seg in path.segments[..path.segments.len() - 1].iter().rev() {
        let mut parent = ystore_tree::DataNode::new(
            current.module.clone(),
            seg.name.clone(),
            ystore_types::Value::Container,
        );
        parent.keys = seg
            .key_values()
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        parent.children.push(current);
        current = parent;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use ystore_tree::DataNode;
    use ystore_types::{Priority, SessionId, SubscriptionOptions, Value};

    use crate::registry::CallbackOutcome;

    fn sid(n: u32) -> SessionId {
        SessionId::new(n).unwrap()
    }

    fn running() -> DataTree {
        let mut cont = DataNode::new("m", "cont", Value::Container);
        cont.children
            .push(DataNode::new("m", "leaf", Value::String("cfg".to_owned())));
        DataTree { roots: vec![cont] }
    }

    #[test]
    fn unowned_config_is_invisible() {
        let reg = SubscriptionRegistry::new();
        let view = build_operational(&running(), &reg, "m").unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn owner_subscription_exposes_config() {
        let reg = SubscriptionRegistry::new();
        reg.subscribe(
            "m",
            None,
            Priority::DEFAULT,
            SubscriptionOptions::DEFAULT,
            sid(1),
            SubscriberKind::ModuleChange(Arc::new(|_| CallbackOutcome::Ok)),
            None,
        );
        let view = build_operational(&running(), &reg, "m").unwrap();
        assert_eq!(view, running().filter_module("m"));
    }

    #[test]
    fn passive_subscription_does_not_expose() {
        let reg = SubscriptionRegistry::new();
        reg.subscribe(
            "m",
            None,
            Priority::DEFAULT,
            SubscriptionOptions::PASSIVE,
            sid(1),
            SubscriberKind::ModuleChange(Arc::new(|_| CallbackOutcome::Ok)),
            None,
        );
        let view = build_operational(&running(), &reg, "m").unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn provider_contribution_is_merged() {
        let reg = SubscriptionRegistry::new();
        reg.subscribe(
            "m",
            Some("/m:state".to_owned()),
            Priority::DEFAULT,
            SubscriptionOptions::DEFAULT,
            sid(1),
            SubscriberKind::OperGet(Arc::new(|_, _| {
                let mut t = DataTree::new();
                t.roots
                    .push(DataNode::new("m", "state", Value::Uint32(42)));
                Ok(t)
            })),
            None,
        );
        let view = build_operational(&running(), &reg, "m").unwrap();
        let p = Path::parse("/m:state").unwrap();
        assert_eq!(view.get(&p).unwrap().value, Value::Uint32(42));
    }

    #[test]
    fn failing_provider_degrades_but_succeeds() {
        let reg = SubscriptionRegistry::new();
        reg.subscribe(
            "m",
            Some("/m:state".to_owned()),
            Priority::DEFAULT,
            SubscriptionOptions::DEFAULT,
            sid(1),
            SubscriberKind::OperGet(Arc::new(|_, _| {
                Err(ystore_error::StoreError::internal("provider down"))
            })),
            None,
        );
        let view = build_operational(&running(), &reg, "m").unwrap();
        assert!(view.is_empty());
    }
}
