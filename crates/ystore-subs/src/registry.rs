//! The in-process subscription registry.
//!
//! Every subscriber a connection registers lands here; the commit
//! orchestrator, RPC dispatch, and notification fan-out all read from
//! this table. Cross-process visibility is mirrored separately into the
//! per-module event rings.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use ystore_edit::{Diff, SessionEdit};
use ystore_error::ErrorInfo;
use ystore_tree::DataTree;
use ystore_types::{
    EventId, EventPhase, NotifKind, Priority, SessionId, SubscriptionOptions, Timestamp,
};

// ---------------------------------------------------------------------------
// Callback types
// ---------------------------------------------------------------------------

/// What a module-change callback returns.
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    Ok,
    /// `update` phase only: a supplemental edit merged into the pending
    /// change before re-validation.
    Amend(SessionEdit),
    /// A veto during `change`; logged only during `done`/`abort`.
    Error(ErrorInfo),
}

/// Everything a module-change callback sees for one event.
pub struct ModuleChangeEvent<'a> {
    pub event_id: EventId,
    pub phase: EventPhase,
    pub module: &'a str,
    /// The xpath filter the subscription was registered with.
    pub xpath: Option<&'a str>,
    pub diff: &'a Diff,
    pub originator: Option<SessionId>,
}

pub type ModuleChangeCb =
    Arc<dyn Fn(&ModuleChangeEvent<'_>) -> CallbackOutcome + Send + Sync>;

/// Operational provider: returns its contribution for the subscribed
/// subtree; the registry stitches contributions into the overlay.
pub type OperGetCb =
    Arc<dyn Fn(&str, &str) -> ystore_error::Result<DataTree> + Send + Sync>;

/// RPC handler: input tree in, output tree out.
pub type RpcCb = Arc<dyn Fn(&str, &DataTree) -> ystore_error::Result<DataTree> + Send + Sync>;

/// Notification consumer.
pub type NotifCb = Arc<dyn Fn(NotifKind, &str, &DataTree, Timestamp) + Send + Sync>;

/// Kind-specific callback of a subscription.
#[derive(Clone)]
pub enum SubscriberKind {
    ModuleChange(ModuleChangeCb),
    OperGet(OperGetCb),
    Rpc(RpcCb),
    Notification(NotifCb),
}

impl SubscriberKind {
    const fn label(&self) -> &'static str {
        match self {
            Self::ModuleChange(_) => "module-change",
            Self::OperGet(_) => "operational-get",
            Self::Rpc(_) => "rpc",
            Self::Notification(_) => "notification",
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Identifies a subscription context; `ctx_reuse` files several
/// subscriptions under one handle, and unsubscribing the handle removes
/// them all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// One registered subscription.
pub struct Subscription {
    pub id: u64,
    pub handle: SubscriptionHandle,
    pub module: String,
    pub xpath: Option<String>,
    pub priority: Priority,
    pub opts: SubscriptionOptions,
    pub session: SessionId,
    /// Registration order within the registry; ties in priority resolve
    /// by this.
    pub seq: u64,
    pub kind: SubscriberKind,
}

impl Subscription {
    /// Whether this module-change subscriber takes part in the `update`
    /// phase.
    #[must_use]
    pub fn wants_update(&self) -> bool {
        self.opts.contains(SubscriptionOptions::UPDATE)
    }

    /// Whether this subscriber only receives `done` events.
    #[must_use]
    pub fn done_only(&self) -> bool {
        self.opts.contains(SubscriptionOptions::DONE_ONLY)
    }

    /// Whether this subscriber owns its subtree for the operational view.
    #[must_use]
    pub fn is_owner(&self) -> bool {
        !self.opts.contains(SubscriptionOptions::PASSIVE)
    }
}

// ---------------------------------------------------------------------------
// SubscriptionRegistry
// ---------------------------------------------------------------------------

/// The registry shared by every connection of one store instance.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subs: RwLock<Vec<Arc<Subscription>>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription. `reuse` files it under an existing handle
    /// instead of minting a new one.
    #[allow(clippy::too_many_arguments)]
    pub fn subscribe(
        &self,
        module: impl Into<String>,
        xpath: Option<String>,
        priority: Priority,
        opts: SubscriptionOptions,
        session: SessionId,
        kind: SubscriberKind,
        reuse: Option<SubscriptionHandle>,
    ) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = reuse.unwrap_or(SubscriptionHandle(id));
        let module = module.into();
        debug!(
            id,
            module = %module,
            kind = kind.label(),
            priority = %priority,
            "registered subscription"
        );
        self.subs.write().push(Arc::new(Subscription {
            id,
            handle,
            module,
            xpath,
            priority,
            opts,
            session,
            seq: id,
            kind,
        }));
        handle
    }

    /// Remove every subscription filed under the handle. Returns how many
    /// were removed.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> usize {
        let mut subs = self.subs.write();
        let before = subs.len();
        subs.retain(|s| s.handle != handle);
        let removed = before - subs.len();
        debug!(handle = handle.0, removed, "unsubscribed");
        removed
    }

    /// Remove everything a session registered.
    pub fn remove_session(&self, session: SessionId) -> usize {
        let mut subs = self.subs.write();
        let before = subs.len();
        subs.retain(|s| s.session != session);
        before - subs.len()
    }

    /// Module-change subscribers for a module in delivery order:
    /// priority descending, then registration order.
    #[must_use]
    pub fn change_subscribers(&self, module: &str) -> Vec<Arc<Subscription>> {
        let mut out: Vec<Arc<Subscription>> = self
            .subs
            .read()
            .iter()
            .filter(|s| s.module == module && matches!(s.kind, SubscriberKind::ModuleChange(_)))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.seq.cmp(&b.seq))
        });
        out
    }

    /// The `update`-phase subset of [`Self::change_subscribers`].
    #[must_use]
    pub fn update_subscribers(&self, module: &str) -> Vec<Arc<Subscription>> {
        self.change_subscribers(module)
            .into_iter()
            .filter(|s| s.wants_update())
            .collect()
    }

    /// Operational providers for a module, registration order.
    #[must_use]
    pub fn oper_providers(&self, module: &str) -> Vec<Arc<Subscription>> {
        self.subs
            .read()
            .iter()
            .filter(|s| s.module == module && matches!(s.kind, SubscriberKind::OperGet(_)))
            .cloned()
            .collect()
    }

    /// Subtree prefixes of the module owned by live non-passive
    /// module-change subscribers; `None` xpath owns the whole module.
    #[must_use]
    pub fn owned_prefixes(&self, module: &str) -> Vec<Option<String>> {
        self.subs
            .read()
            .iter()
            .filter(|s| {
                s.module == module
                    && matches!(s.kind, SubscriberKind::ModuleChange(_))
                    && s.is_owner()
            })
            .map(|s| s.xpath.clone())
            .collect()
    }

    /// The RPC handler for an xpath: highest priority wins, ties by
    /// registration order.
    #[must_use]
    pub fn rpc_subscriber(&self, xpath: &str) -> Option<Arc<Subscription>> {
        self.subs
            .read()
            .iter()
            .filter(|s| {
                matches!(s.kind, SubscriberKind::Rpc(_)) && s.xpath.as_deref() == Some(xpath)
            })
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.seq.cmp(&a.seq))
            })
            .cloned()
    }

    /// Notification subscribers for a module, optionally narrowed by the
    /// notification xpath.
    #[must_use]
    pub fn notif_subscribers(&self, module: &str, xpath: &str) -> Vec<Arc<Subscription>> {
        self.subs
            .read()
            .iter()
            .filter(|s| {
                s.module == module
                    && matches!(s.kind, SubscriberKind::Notification(_))
                    && s.xpath.as_deref().map_or(true, |f| f == xpath)
            })
            .cloned()
            .collect()
    }

    /// Look up a live subscription by id.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<Arc<Subscription>> {
        self.subs.read().iter().find(|s| s.id == id).cloned()
    }
}
