//! Commit pipeline implementation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use ystore_edit::{apply_edit, compute_diff, Diff, SessionEdit};
use ystore_error::{Result, StoreError};
use ystore_plugin::DatastorePlugin;
use ystore_shm::{EventRecord, ModuleLockTable, OwnerId};
use ystore_subs::{
    CallbackOutcome, ModuleChangeEvent, RingKind, RingTable, SubscriberKind, Subscription,
    SubscriptionRegistry,
};
use ystore_tree::{validate_module, DataTree, SchemaContext};
use ystore_types::{
    DatastoreKind, EventId, EventPhase, NetconfSessionId, SessionId, Timestamp,
};

/// Resolves the datastore plugin serving `(module, datastore)`.
pub trait PluginResolver: Send + Sync {
    fn resolve(&self, module: &str, ds: DatastoreKind) -> Result<Arc<dyn DatastorePlugin>>;
}

/// One commit to run through the pipeline.
pub struct CommitRequest {
    pub event_id: EventId,
    pub ds: DatastoreKind,
    pub session: Option<SessionId>,
    pub nc_id: NetconfSessionId,
    /// Stored content of the touched modules before the transaction.
    pub old: DataTree,
    /// Merged and validated candidate content.
    pub new: DataTree,
}

/// What a successful commit produced.
#[derive(Debug)]
pub struct CommitOutcome {
    /// The tree actually stored (update subscribers may have amended it).
    pub stored: DataTree,
    /// The final classified change set delivered to subscribers.
    pub diff: Diff,
}

/// The commit engine; one per store instance, shared by sessions.
pub struct Orchestrator<'a> {
    pub locks: &'a ModuleLockTable,
    pub registry: &'a SubscriptionRegistry,
    pub rings: &'a RingTable,
    pub ctx: &'a SchemaContext,
    pub plugins: &'a dyn PluginResolver,
    /// How long to wait for cross-process subscriber acks per phase.
    pub ack_timeout: Duration,
}

impl Orchestrator<'_> {
    /// Run the five-phase pipeline. On success the datastore holds
    /// `outcome.stored`; on any error it holds the pre-transaction state.
    pub fn apply(&self, request: CommitRequest) -> Result<CommitOutcome> {
        let mut new = request.new.clone();
        let mut diff = compute_diff(&request.old, &new, self.ctx);
        if diff.is_empty() {
            debug!(event = %request.event_id, "empty diff; nothing to commit");
            return Ok(CommitOutcome { stored: new, diff });
        }
        let mods = diff.modules();

        // The advisory ds-lock gates commits from other sessions.
        for module in &mods {
            if let Some(holder) = self.locks.ds_holder(module) {
                if request.session != Some(holder) {
                    return Err(StoreError::Locked {
                        module: module.clone(),
                        holder: holder.get(),
                    });
                }
            }
        }

        let owner = request
            .session
            .map_or_else(OwnerId::process, OwnerId::session);
        let mut held = HeldModules::acquire(self.locks, owner, &mods, self.ack_timeout)?;
        info!(event = %request.event_id, modules = ?mods, "commit started");

        // Phase 1: update.
        self.phase_update(&request, &mut new, &mut diff, &mods)?;

        // Phase 2: change.
        let mut delivered: Vec<(String, Arc<Subscription>)> = Vec::new();
        if let Err(veto) = self.phase_change(&request, &diff, &mods, &mut delivered) {
            self.phase_abort(&request, &diff, &delivered);
            return Err(veto);
        }

        // Phase 3: store, under the write lock.
        held.upgrade_all()?;
        if let Err(e) = self.phase_store(&request, &new, &mods) {
            self.phase_abort(&request, &diff, &delivered);
            return Err(e);
        }

        // Phase 4: done. Never fails the commit.
        self.phase_done(&request, &diff, &mods);
        info!(event = %request.event_id, "commit finished");
        Ok(CommitOutcome { stored: new, diff })
    }

    // -- phase 1 ------------------------------------------------------------

    fn phase_update(
        &self,
        request: &CommitRequest,
        new: &mut DataTree,
        diff: &mut Diff,
        mods: &[String],
    ) -> Result<()> {
        let mut amendments: Vec<SessionEdit> = Vec::new();
        let mut responded: Vec<(String, Arc<Subscription>)> = Vec::new();

        for module in mods {
            let module_diff = diff_for_module(diff, module);
            for sub in self.registry.update_subscribers(module) {
                let outcome = self.invoke(&sub, EventPhase::Update, module, &module_diff, request);
                match outcome {
                    CallbackOutcome::Ok => responded.push((module.clone(), sub)),
                    CallbackOutcome::Amend(edit) => {
                        responded.push((module.clone(), sub));
                        amendments.push(edit);
                    }
                    CallbackOutcome::Error(info) => {
                        // Roll back the update subscribers that already
                        // prepared; nothing else saw this transaction.
                        self.phase_abort(request, diff, &responded);
                        return Err(info.into_error());
                    }
                }
            }
            // Cross-process update subscribers answer through the ring.
            match self.ring_roundtrip(request, EventPhase::Update, module, &module_diff)? {
                RingVerdict::Ok { amendments: remote } => {
                    amendments.extend(remote);
                }
                RingVerdict::Veto(err) => {
                    self.phase_abort(request, diff, &responded);
                    return Err(err);
                }
            }
        }

        if amendments.is_empty() {
            return Ok(());
        }
        debug!(count = amendments.len(), "re-merging update-phase amendments");
        let mut amended = new.clone();
        for edit in &amendments {
            amended = apply_edit(&amended, edit)?;
        }
        let refreshed = compute_diff(&request.old, &amended, self.ctx);
        let refreshed_mods = refreshed.modules();
        if refreshed_mods.iter().any(|m| !mods.contains(m)) {
            self.phase_abort(request, diff, &responded);
            return Err(StoreError::CallbackFailed {
                module: refreshed_mods.join(","),
                detail: "update amendment touches modules outside the transaction".to_owned(),
            });
        }
        for module in &refreshed_mods {
            if let Err(e) = validate_module(&amended, self.ctx, module) {
                self.phase_abort(request, diff, &responded);
                return Err(e);
            }
        }
        *new = amended;
        *diff = refreshed;
        Ok(())
    }

    // -- phase 2 ------------------------------------------------------------

    fn phase_change(
        &self,
        request: &CommitRequest,
        diff: &Diff,
        mods: &[String],
        delivered: &mut Vec<(String, Arc<Subscription>)>,
    ) -> Result<()> {
        for module in mods {
            let module_diff = diff_for_module(diff, module);
            for sub in self.registry.change_subscribers(module) {
                if sub.done_only() {
                    continue;
                }
                match self.invoke(&sub, EventPhase::Change, module, &module_diff, request) {
                    CallbackOutcome::Ok | CallbackOutcome::Amend(_) => {
                        delivered.push((module.clone(), sub));
                    }
                    CallbackOutcome::Error(info) => {
                        debug!(module, "change vetoed by subscriber");
                        return Err(info.into_error());
                    }
                }
            }
            match self.ring_roundtrip(request, EventPhase::Change, module, &module_diff)? {
                RingVerdict::Ok { .. } => {}
                RingVerdict::Veto(err) => return Err(err),
            }
        }
        Ok(())
    }

    // -- phase 3 ------------------------------------------------------------

    fn phase_store(&self, request: &CommitRequest, new: &DataTree, mods: &[String]) -> Result<()> {
        let mut stored: Vec<String> = Vec::new();
        for module in mods {
            let plugin = self.plugins.resolve(module, request.ds)?;
            if let Err(e) = plugin.store(module, request.ds, &new.filter_module(module)) {
                warn!(module, error = %e, "store failed; rolling back");
                for done in &stored {
                    let plugin = match self.plugins.resolve(done, request.ds) {
                        Ok(p) => p,
                        Err(e2) => {
                            warn!(module = %done, error = %e2, "rollback resolve failed");
                            continue;
                        }
                    };
                    if let Err(e2) =
                        plugin.store(done, request.ds, &request.old.filter_module(done))
                    {
                        warn!(module = %done, error = %e2, "rollback store failed");
                    }
                }
                return Err(e);
            }
            stored.push(module.clone());
        }
        Ok(())
    }

    // -- phase 4 ------------------------------------------------------------

    fn phase_done(&self, request: &CommitRequest, diff: &Diff, mods: &[String]) {
        for module in mods {
            let module_diff = diff_for_module(diff, module);
            for sub in self.registry.change_subscribers(module) {
                if let CallbackOutcome::Error(info) =
                    self.invoke(&sub, EventPhase::Done, module, &module_diff, request)
                {
                    // Done is past the point of no return.
                    warn!(module, code = ?info.code, "error in done callback (ignored)");
                }
            }
            if let Err(e) = self.ring_best_effort(request, EventPhase::Done, module, &module_diff)
            {
                warn!(module, error = %e, "cross-process done delivery failed (ignored)");
            }
        }
    }

    // -- phase 5 ------------------------------------------------------------

    /// Deliver `abort` to every subscriber that saw `change`, in reverse
    /// priority (reverse delivery order).
    fn phase_abort(
        &self,
        request: &CommitRequest,
        diff: &Diff,
        delivered: &[(String, Arc<Subscription>)],
    ) {
        for (module, sub) in delivered.iter().rev() {
            let module_diff = diff_for_module(diff, module);
            if let CallbackOutcome::Error(info) =
                self.invoke(sub, EventPhase::Abort, module, &module_diff, request)
            {
                warn!(module = %module, code = ?info.code, "error in abort callback (ignored)");
            }
        }
        // Cross-process: one abort per touched module's ring.
        let mut seen: Vec<&str> = Vec::new();
        for (module, _) in delivered {
            if seen.contains(&module.as_str()) {
                continue;
            }
            seen.push(module);
            let module_diff = diff_for_module(diff, module);
            if let Err(e) = self.ring_best_effort(request, EventPhase::Abort, module, &module_diff)
            {
                warn!(module = %module, error = %e, "cross-process abort delivery failed (ignored)");
            }
        }
    }

    // -- helpers ------------------------------------------------------------

    fn invoke(
        &self,
        sub: &Subscription,
        phase: EventPhase,
        module: &str,
        module_diff: &Diff,
        request: &CommitRequest,
    ) -> CallbackOutcome {
        let SubscriberKind::ModuleChange(cb) = &sub.kind else {
            return CallbackOutcome::Ok;
        };
        let filtered;
        let diff_ref = match sub.xpath.as_deref() {
            Some(prefix) => {
                filtered = Diff {
                    changes: module_diff.iter_matching(prefix).cloned().collect(),
                };
                &filtered
            }
            None => module_diff,
        };
        if diff_ref.is_empty() && phase != EventPhase::Done {
            // Nothing under this subscriber's filter; it has nothing to
            // verify or abort.
            return CallbackOutcome::Ok;
        }
        cb(&ModuleChangeEvent {
            event_id: request.event_id,
            phase,
            module,
            xpath: sub.xpath.as_deref(),
            diff: diff_ref,
            originator: request.session,
        })
    }

    /// Post a phase event to the module's ring and wait for every live
    /// cross-process consumer to acknowledge.
    fn ring_roundtrip(
        &self,
        request: &CommitRequest,
        phase: EventPhase,
        module: &str,
        module_diff: &Diff,
    ) -> Result<RingVerdict> {
        let Some(ring) = self.rings.existing(module, RingKind::ModuleChange) else {
            return Ok(RingVerdict::Ok {
                amendments: Vec::new(),
            });
        };
        let expected = ring.live_mask();
        if expected == 0 {
            return Ok(RingVerdict::Ok {
                amendments: Vec::new(),
            });
        }
        ring.post(
            self.record(request, phase, module, module_diff)?,
            expected,
            self.ack_timeout,
        )?;
        let acks = ring.wait_acks(request.event_id, self.ack_timeout)?;
        let mut amendments = Vec::new();
        for ack in acks {
            if let Some(info) = ack.error {
                if phase.error_vetoes() {
                    return Ok(RingVerdict::Veto(info.into_error()));
                }
                warn!(module, slot = ack.slot, "subscriber error outside veto phase (ignored)");
            }
            if let Some(payload) = ack.amendment {
                if phase == EventPhase::Update {
                    let edit: SessionEdit =
                        serde_json::from_slice(&payload).map_err(|e| StoreError::RegionCorrupt {
                            detail: format!("malformed amendment payload: {e}"),
                        })?;
                    amendments.push(edit);
                }
            }
        }
        Ok(RingVerdict::Ok { amendments })
    }

    /// Post a non-vetoable phase event; errors only logged by the caller.
    fn ring_best_effort(
        &self,
        request: &CommitRequest,
        phase: EventPhase,
        module: &str,
        module_diff: &Diff,
    ) -> Result<()> {
        let Some(ring) = self.rings.existing(module, RingKind::ModuleChange) else {
            return Ok(());
        };
        let expected = ring.live_mask();
        if expected == 0 {
            return Ok(());
        }
        ring.post(
            self.record(request, phase, module, module_diff)?,
            expected,
            self.ack_timeout,
        )?;
        ring.wait_acks(request.event_id, self.ack_timeout).map(|_| ())
    }

    fn record(
        &self,
        request: &CommitRequest,
        phase: EventPhase,
        module: &str,
        module_diff: &Diff,
    ) -> Result<EventRecord> {
        Ok(EventRecord {
            event_id: request.event_id,
            phase,
            module: module.to_owned(),
            priority: ystore_types::Priority::DEFAULT,
            originator: request.session,
            originator_nc: request.nc_id,
            timestamp: Timestamp::now(),
            payload: module_diff.to_payload()?,
        })
    }
}

fn diff_for_module(diff: &Diff, module: &str) -> Diff {
    diff.split_by_module().remove(module).unwrap_or_default()
}

enum RingVerdict {
    Ok { amendments: Vec<SessionEdit> },
    Veto(StoreError),
}

// ---------------------------------------------------------------------------
// HeldModules
// ---------------------------------------------------------------------------

/// Module locks held for the duration of one commit; released in reverse
/// acquisition order on drop, whatever path exits the pipeline.
struct HeldModules<'a> {
    locks: &'a ModuleLockTable,
    owner: OwnerId,
    /// `(module, upgraded-to-write)` in acquisition order.
    held: Vec<(String, bool)>,
    timeout: Duration,
}

impl<'a> HeldModules<'a> {
    fn acquire(
        locks: &'a ModuleLockTable,
        owner: OwnerId,
        mods: &[String],
        timeout: Duration,
    ) -> Result<Self> {
        let mut this = Self {
            locks,
            owner,
            held: Vec::with_capacity(mods.len()),
            timeout,
        };
        for module in mods {
            locks.upgradable_lock(module, owner, timeout)?;
            this.held.push((module.clone(), false));
        }
        Ok(this)
    }

    fn upgrade_all(&mut self) -> Result<()> {
        for (module, upgraded) in &mut self.held {
            self.locks.upgrade(module, self.owner, self.timeout)?;
            *upgraded = true;
        }
        Ok(())
    }
}

impl Drop for HeldModules<'_> {
    fn drop(&mut self) {
        for (module, upgraded) in self.held.iter().rev() {
            let result = if *upgraded {
                self.locks.write_unlock(module, self.owner)
            } else {
                self.locks.upgradable_unlock(module, self.owner)
            };
            if let Err(e) = result {
                warn!(module = %module, error = %e, "lock release failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use ystore_plugin::MemoryPlugin;
    use ystore_tree::{DataNode, SchemaModule, SchemaNode};
    use ystore_types::{Priority, SubscriptionOptions, Value, ValueKind};

    struct SinglePlugin(Arc<MemoryPlugin>);

    impl PluginResolver for SinglePlugin {
        fn resolve(&self, _module: &str, _ds: DatastoreKind) -> Result<Arc<dyn DatastorePlugin>> {
            Ok(Arc::<MemoryPlugin>::clone(&self.0) as Arc<dyn DatastorePlugin>)
        }
    }

    fn ctx() -> SchemaContext {
        let mut ctx = SchemaContext::new(ystore_types::Generation::FIRST);
        ctx.insert_module(SchemaModule::new(
            "m",
            vec![
                SchemaNode::leaf("a", ValueKind::Uint32),
                SchemaNode::leaf("extra", ValueKind::Uint32),
            ],
        ));
        ctx
    }

    fn tree(pairs: &[(&str, u32)]) -> DataTree {
        DataTree {
            roots: pairs
                .iter()
                .map(|(n, v)| DataNode::new("m", *n, Value::Uint32(*v)))
                .collect(),
        }
    }

    fn sid(n: u32) -> SessionId {
        SessionId::new(n).unwrap()
    }

    fn request(old: DataTree, new: DataTree, event: u64) -> CommitRequest {
        CommitRequest {
            event_id: EventId::new(event),
            ds: DatastoreKind::Running,
            session: Some(sid(1)),
            nc_id: NetconfSessionId(0),
            old,
            new,
        }
    }

    struct Fixture {
        locks: ModuleLockTable,
        registry: SubscriptionRegistry,
        rings: RingTable,
        ctx: SchemaContext,
        plugin: Arc<MemoryPlugin>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                locks: ModuleLockTable::default(),
                registry: SubscriptionRegistry::new(),
                rings: RingTable::new(),
                ctx: ctx(),
                plugin: Arc::new(MemoryPlugin::new()),
            }
        }

        fn run(&self, req: CommitRequest) -> Result<CommitOutcome> {
            let resolver = SinglePlugin(Arc::clone(&self.plugin));
            let orch = Orchestrator {
                locks: &self.locks,
                registry: &self.registry,
                rings: &self.rings,
                ctx: &self.ctx,
                plugins: &resolver,
                ack_timeout: Duration::from_millis(500),
            };
            orch.apply(req)
        }
    }

    #[test]
    fn commit_stores_and_delivers_change_then_done() {
        let f = Fixture::new();
        let phases: Arc<Mutex<Vec<EventPhase>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&phases);
        f.registry.subscribe(
            "m",
            None,
            Priority::DEFAULT,
            SubscriptionOptions::DEFAULT,
            sid(9),
            SubscriberKind::ModuleChange(Arc::new(move |ev| {
                seen.lock().push(ev.phase);
                CallbackOutcome::Ok
            })),
            None,
        );

        let outcome = f.run(request(tree(&[]), tree(&[("a", 1)]), 1)).unwrap();
        assert_eq!(outcome.diff.changes.len(), 1);
        assert_eq!(*phases.lock(), vec![EventPhase::Change, EventPhase::Done]);
        assert_eq!(
            f.plugin.load("m", DatastoreKind::Running).unwrap(),
            tree(&[("a", 1)])
        );
    }

    #[test]
    fn veto_aborts_with_reverse_priority_abort_events() {
        let f = Fixture::new();
        let log: Arc<Mutex<Vec<(u32, EventPhase)>>> = Arc::new(Mutex::new(Vec::new()));

        // Two well-behaved subscribers at priorities 10 and 5, a vetoer at 1.
        for prio in [10_u32, 5] {
            let log2 = Arc::clone(&log);
            f.registry.subscribe(
                "m",
                None,
                Priority::new(prio),
                SubscriptionOptions::DEFAULT,
                sid(9),
                SubscriberKind::ModuleChange(Arc::new(move |ev| {
                    log2.lock().push((prio, ev.phase));
                    CallbackOutcome::Ok
                })),
                None,
            );
        }
        let log2 = Arc::clone(&log);
        f.registry.subscribe(
            "m",
            None,
            Priority::new(1),
            SubscriptionOptions::DEFAULT,
            sid(9),
            SubscriberKind::ModuleChange(Arc::new(move |ev| {
                log2.lock().push((1, ev.phase));
                if ev.phase == EventPhase::Change {
                    CallbackOutcome::Error(
                        StoreError::OperationFailed("not ready".to_owned()).to_info(),
                    )
                } else {
                    CallbackOutcome::Ok
                }
            })),
            None,
        );

        // Seed the datastore so rollback is observable.
        f.plugin
            .store("m", DatastoreKind::Running, &tree(&[("a", 1)]))
            .unwrap();
        let err = f
            .run(request(tree(&[("a", 1)]), tree(&[("a", 2)]), 2))
            .unwrap_err();
        assert_eq!(err.code(), ystore_error::ErrorCode::OperationFailed);

        // Datastore unchanged.
        assert_eq!(
            f.plugin.load("m", DatastoreKind::Running).unwrap(),
            tree(&[("a", 1)])
        );
        // change in priority order 10, 5, 1; abort to the others in
        // reverse order (5 then 10), vetoer excluded.
        assert_eq!(
            *log.lock(),
            vec![
                (10, EventPhase::Change),
                (5, EventPhase::Change),
                (1, EventPhase::Change),
                (5, EventPhase::Abort),
                (10, EventPhase::Abort),
            ]
        );
    }

    #[test]
    fn update_phase_amendment_is_merged_and_visible() {
        let f = Fixture::new();
        let updater_ctx = ctx();
        f.registry.subscribe(
            "m",
            None,
            Priority::DEFAULT,
            SubscriptionOptions::UPDATE,
            sid(9),
            SubscriberKind::ModuleChange(Arc::new(move |ev| {
                if ev.phase == EventPhase::Update {
                    let mut edit = SessionEdit::new();
                    edit.set(
                        &updater_ctx,
                        "/m:extra",
                        Some(Value::Uint32(1)),
                        ystore_types::EditOptions::DEFAULT,
                    )
                    .expect("stage amendment");
                    CallbackOutcome::Amend(edit)
                } else {
                    CallbackOutcome::Ok
                }
            })),
            None,
        );

        let change_diffs: Arc<Mutex<Vec<Diff>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&change_diffs);
        f.registry.subscribe(
            "m",
            None,
            Priority::DEFAULT,
            SubscriptionOptions::DEFAULT,
            sid(9),
            SubscriberKind::ModuleChange(Arc::new(move |ev| {
                if ev.phase == EventPhase::Change {
                    sink.lock().push(ev.diff.clone());
                }
                CallbackOutcome::Ok
            })),
            None,
        );

        let outcome = f.run(request(tree(&[]), tree(&[("a", 1)]), 3)).unwrap();
        // The stored tree contains the amendment.
        let stored = f.plugin.load("m", DatastoreKind::Running).unwrap();
        assert!(stored
            .roots
            .iter()
            .any(|n| n.name == "extra" && n.value == Value::Uint32(1)));
        // Non-update subscribers observed a change set containing it.
        let diffs = change_diffs.lock();
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].changes.iter().any(|c| c.xpath == "/m:extra"));
        assert!(outcome.diff.changes.iter().any(|c| c.xpath == "/m:extra"));
    }

    #[test]
    fn ds_lock_by_other_session_blocks_commit() {
        let f = Fixture::new();
        f.locks.ds_lock("m", sid(42)).unwrap();
        let err = f
            .run(request(tree(&[]), tree(&[("a", 1)]), 4))
            .unwrap_err();
        assert!(matches!(err, StoreError::Locked { holder: 42, .. }));

        // The holder itself may commit.
        let mut req = request(tree(&[]), tree(&[("a", 1)]), 5);
        req.session = Some(sid(42));
        f.run(req).unwrap();
    }

    #[test]
    fn done_only_subscriber_sees_only_done() {
        let f = Fixture::new();
        let phases: Arc<Mutex<Vec<EventPhase>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&phases);
        f.registry.subscribe(
            "m",
            None,
            Priority::DEFAULT,
            SubscriptionOptions::DONE_ONLY,
            sid(9),
            SubscriberKind::ModuleChange(Arc::new(move |ev| {
                seen.lock().push(ev.phase);
                CallbackOutcome::Ok
            })),
            None,
        );
        f.run(request(tree(&[]), tree(&[("a", 1)]), 6)).unwrap();
        assert_eq!(*phases.lock(), vec![EventPhase::Done]);
    }

    #[test]
    fn empty_diff_is_a_no_op() {
        let f = Fixture::new();
        let outcome = f.run(request(tree(&[("a", 1)]), tree(&[("a", 1)]), 7)).unwrap();
        assert!(outcome.diff.is_empty());
        // Nothing was stored.
        assert!(f.plugin.load("m", DatastoreKind::Running).unwrap().is_empty());
    }

    #[test]
    fn locks_are_released_after_commit_and_after_veto() {
        let f = Fixture::new();
        f.run(request(tree(&[]), tree(&[("a", 1)]), 8)).unwrap();
        // A later writer acquires immediately.
        let owner = OwnerId::session(sid(5));
        f.locks
            .write_lock("m", owner, Duration::from_millis(100))
            .unwrap();
        f.locks.write_unlock("m", owner).unwrap();

        f.registry.subscribe(
            "m",
            None,
            Priority::DEFAULT,
            SubscriptionOptions::DEFAULT,
            sid(9),
            SubscriberKind::ModuleChange(Arc::new(|ev| {
                if ev.phase == EventPhase::Change {
                    CallbackOutcome::Error(
                        StoreError::OperationFailed("no".to_owned()).to_info(),
                    )
                } else {
                    CallbackOutcome::Ok
                }
            })),
            None,
        );
        f.run(request(tree(&[("a", 1)]), tree(&[("a", 2)]), 9))
            .unwrap_err();
        f.locks
            .write_lock("m", owner, Duration::from_millis(100))
            .unwrap();
        f.locks.write_unlock("m", owner).unwrap();
    }
}
