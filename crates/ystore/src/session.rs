//! Sessions: the unit of client interaction.
//!
//! A session binds a datastore, an effective user, and a staged edit.
//! Reads go straight to the datastore (through the connection's running
//! cache when enabled); writes accumulate in the staged edit until
//! `apply_changes` runs them through the five-phase commit pipeline.
//!
//! Every operation starts by clearing the session error record and
//! checking the schema generation: a session that pinned an older
//! generation fails once with *context changed* (its staged edit is
//! discarded) and continues on the new generation afterwards.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use ystore_commit::{CommitRequest, Orchestrator};
use ystore_edit::{apply_edit, compute_diff, Diff, EditNode, EditOp, SessionEdit};
use ystore_error::{ErrorEntry, ErrorInfo, Result, StoreError};
use ystore_replay::{ReplayPhase, ReplayWindow};
use ystore_subs::{
    build_operational, replay_into, rpc::dispatch_rpc, send_notification, CallbackOutcome,
    ModuleChangeCb, ModuleChangeEvent, NotifCb, OperGetCb, RpcCb, SubscriberKind,
    SubscriptionHandle,
};
use ystore_tree::{validate_module, DataNode, DataTree, Path, SchemaNodeKind};
use ystore_types::{
    DatastoreKind, EditOptions, EventPhase, Generation, Item, MovePosition, NetconfSessionId,
    Priority, SessionId, SubscriptionOptions, Timestamp, Value,
};

use crate::connection::ConnInner;

/// A session on a connection.
pub struct Session {
    conn: Arc<ConnInner>,
    id: SessionId,
    ds: Mutex<DatastoreKind>,
    user: Mutex<String>,
    nc_id: Mutex<NetconfSessionId>,
    edit: Mutex<SessionEdit>,
    error: Mutex<Option<ErrorInfo>>,
    pinned: Mutex<Generation>,
}

impl Session {
    pub(crate) fn start(conn: Arc<ConnInner>, ds: DatastoreKind) -> Result<Self> {
        let raw = conn.shared.main.lock().next_session_id();
        let id = SessionId::new(raw).ok_or_else(|| StoreError::InitFailed {
            detail: "session id allocator wrapped".to_owned(),
        })?;
        let generation = conn.shared.context().generation;
        conn.shared.active_sessions.lock().insert(id, generation);
        debug!(%id, %ds, "session started");
        Ok(Self {
            conn,
            id,
            ds: Mutex::new(ds),
            user: Mutex::new(current_username()),
            nc_id: Mutex::new(NetconfSessionId(0)),
            edit: Mutex::new(SessionEdit::new()),
            error: Mutex::new(None),
            pinned: Mutex::new(generation),
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn datastore(&self) -> DatastoreKind {
        *self.ds.lock()
    }

    /// Rebind the session to another datastore. The staged edit is
    /// discarded; edits are only meaningful against the datastore they
    /// were staged for.
    pub fn switch_ds(&self, ds: DatastoreKind) {
        self.edit.lock().clear();
        *self.ds.lock() = ds;
    }

    /// Attach a NETCONF session id forwarded to subscribers.
    pub fn set_nc_id(&self, nc_id: NetconfSessionId) {
        *self.nc_id.lock() = nc_id;
    }

    #[must_use]
    pub fn nc_id(&self) -> NetconfSessionId {
        *self.nc_id.lock()
    }

    /// Change the effective user. Only a process running as the
    /// configured superuser may do this.
    pub fn set_user(&self, user: &str) -> Result<()> {
        self.run(|| {
            let uid = current_uid();
            if uid != Some(self.conn.shared.config.superuser_uid) {
                return Err(StoreError::Unauthorized {
                    user: current_username(),
                    module: String::new(),
                    access: "user elevation".to_owned(),
                });
            }
            *self.user.lock() = user.to_owned();
            Ok(())
        })
    }

    #[must_use]
    pub fn user(&self) -> String {
        self.user.lock().clone()
    }

    /// The error record of the last failed operation, if any.
    #[must_use]
    pub fn get_error(&self) -> Option<ErrorInfo> {
        self.error.lock().clone()
    }

    /// Set the error record from inside a callback, so the veto reaching
    /// the originator carries context.
    pub fn set_error(&self, message: &str, xpath: Option<&str>) {
        *self.error.lock() = Some(ErrorInfo {
            code: ystore_error::ErrorCode::OperationFailed,
            entries: vec![ErrorEntry::new(message, xpath.map(str::to_owned))],
        });
    }

    // --- reads -------------------------------------------------------------

    /// One data element; *not found* misses fall back to the schema
    /// default (flagged as such) when the leaf defines one.
    pub fn get_item(&self, xpath: &str) -> Result<Item> {
        self.run(|| {
            let ctx = self.conn.shared.context();
            let path = Path::parse(xpath)?;
            let schema = ctx.find_node(&path)?;
            let tree = self.load_tree(path.module())?;
            match tree.get(&path) {
                Ok(node) => Ok(Item {
                    xpath: xpath.to_owned(),
                    value: node.value.clone(),
                    default: node.default,
                }),
                Err(StoreError::NotFound { .. }) => {
                    if let SchemaNodeKind::Leaf {
                        value_kind,
                        default: Some(text),
                        ..
                    } = &schema.kind
                    {
                        let value =
                            Value::parse_canonical(*value_kind, text).ok_or_else(|| {
                                StoreError::SchemaLibrary {
                                    detail: format!(
                                        "schema default \"{text}\" is not a valid {value_kind:?}"
                                    ),
                                }
                            })?;
                        Ok(Item {
                            xpath: xpath.to_owned(),
                            value,
                            default: true,
                        })
                    } else {
                        Err(StoreError::not_found(xpath))
                    }
                }
                Err(e) => Err(e),
            }
        })
    }

    /// Every element matching the path.
    pub fn get_items(&self, xpath: &str) -> Result<Vec<Item>> {
        self.run(|| {
            let ctx = self.conn.shared.context();
            let path = Path::parse(xpath)?;
            ctx.find_node(&path)?;
            let tree = self.load_tree(path.module())?;
            Ok(tree
                .find_with_paths(&path)
                .into_iter()
                .map(|(p, node)| Item {
                    xpath: p,
                    value: node.value.clone(),
                    default: node.default,
                })
                .collect())
        })
    }

    /// A deep copy of the subtree at the path (exactly one match).
    pub fn get_subtree(&self, xpath: &str) -> Result<DataNode> {
        self.run(|| {
            let ctx = self.conn.shared.context();
            let path = Path::parse(xpath)?;
            ctx.find_node(&path)?;
            let tree = self.load_tree(path.module())?;
            tree.get(&path).map(Clone::clone)
        })
    }

    /// Deep copies of every subtree matching the path.
    pub fn get_subtrees(&self, xpath: &str) -> Result<Vec<DataNode>> {
        self.run(|| {
            let ctx = self.conn.shared.context();
            let path = Path::parse(xpath)?;
            ctx.find_node(&path)?;
            let tree = self.load_tree(path.module())?;
            Ok(tree.find(&path).into_iter().cloned().collect())
        })
    }

    // --- edits -------------------------------------------------------------

    /// Stage a set of a typed value.
    pub fn set_item(&self, xpath: &str, value: Option<Value>, opts: EditOptions) -> Result<()> {
        self.run(|| {
            self.require_editable()?;
            let ctx = self.conn.shared.context();
            self.edit.lock().set(&ctx, xpath, value, opts)
        })
    }

    /// Stage a set from the value's canonical string form.
    pub fn set_item_str(&self, xpath: &str, value: &str, opts: EditOptions) -> Result<()> {
        self.run(|| {
            self.require_editable()?;
            let ctx = self.conn.shared.context();
            let path = Path::parse(xpath)?;
            let schema = ctx.find_node(&path)?;
            let typed = match schema.leaf_value_kind() {
                Some(kind) => Some(Value::parse_canonical(kind, value).ok_or_else(|| {
                    StoreError::invalid_arg(format!(
                        "\"{value}\" is not a valid {kind:?} value for \"{xpath}\""
                    ))
                })?),
                None => None,
            };
            self.edit.lock().set(&ctx, xpath, typed, opts)
        })
    }

    /// Stage a delete.
    pub fn delete_item(&self, xpath: &str, opts: EditOptions) -> Result<()> {
        self.run(|| {
            self.require_editable()?;
            let ctx = self.conn.shared.context();
            self.edit.lock().delete(&ctx, xpath, opts)
        })
    }

    /// Stage a move of a user-ordered instance.
    pub fn move_item(
        &self,
        xpath: &str,
        position: MovePosition,
        anchor: Option<&str>,
    ) -> Result<()> {
        self.run(|| {
            self.require_editable()?;
            let ctx = self.conn.shared.context();
            self.edit.lock().move_item(&ctx, xpath, position, anchor)
        })
    }

    /// Merge an edit-config-style batch into the staged edit.
    pub fn edit_batch(&self, batch: Vec<EditNode>, default_op: EditOp) -> Result<()> {
        self.run(|| {
            self.require_editable()?;
            let ctx = self.conn.shared.context();
            self.edit.lock().edit_batch(&ctx, batch, default_op)
        })
    }

    /// Drop the staged edit.
    pub fn discard_changes(&self) -> Result<()> {
        self.edit.lock().clear();
        Ok(())
    }

    /// Re-validate the staged view without committing.
    pub fn validate(&self) -> Result<()> {
        self.run(|| {
            let ctx = self.conn.shared.context();
            let edit = self.edit.lock().clone();
            let modules = touched_modules(&edit)?;
            let reference = self.load_config_many(&modules)?;
            let merged = apply_edit(&reference, &edit)?;
            for module in &modules {
                validate_module(&merged, &ctx, module)?;
            }
            Ok(())
        })
    }

    /// Apply the staged edit through the five-phase commit pipeline.
    pub fn apply_changes(&self) -> Result<()> {
        self.run(|| {
            self.require_editable()?;
            let edit = self.edit.lock().clone();
            if edit.is_empty() {
                return Ok(());
            }
            let ctx = self.conn.shared.context();
            let modules = touched_modules(&edit)?;
            self.check_write_access(&modules)?;
            let old = self.load_config_many(&modules)?;
            let merged = apply_edit(&old, &edit)?;
            for module in &modules {
                validate_module(&merged, &ctx, module)?;
            }

            let event_id = self.conn.shared.main.lock().next_event_id();
            let orchestrator = Orchestrator {
                locks: &self.conn.shared.locks,
                registry: &self.conn.shared.registry,
                rings: &self.conn.shared.rings,
                ctx: &ctx,
                plugins: &*self.conn.shared,
                ack_timeout: self.conn.shared.config.apply_timeout,
            };
            orchestrator.apply(CommitRequest {
                event_id,
                ds: self.datastore(),
                session: Some(self.id),
                nc_id: self.nc_id(),
                old,
                new: merged,
            })?;
            self.edit.lock().clear();
            for module in &modules {
                self.conn.invalidate_cache(module);
            }
            Ok(())
        })
    }

    /// Copy one datastore over another (one module or all), through the
    /// commit pipeline so subscribers mediate the change.
    pub fn copy_config(
        &self,
        module: Option<&str>,
        src: DatastoreKind,
        dst: DatastoreKind,
    ) -> Result<()> {
        self.run(|| {
            if !dst.is_editable() {
                return Err(StoreError::Unsupported(format!(
                    "datastore {dst} cannot be written"
                )));
            }
            let modules = self.module_set(module)?;
            self.check_write_access(&modules)?;
            let mut src_tree = DataTree::new();
            let mut dst_tree = DataTree::new();
            for m in &modules {
                let from = self.conn.shared.plugin_for(m, src)?.load(m, src)?;
                src_tree.roots.extend(from.roots);
                let to = self.conn.shared.plugin_for(m, dst)?.load(m, dst)?;
                dst_tree.roots.extend(to.roots);
            }
            self.commit_replacement(dst, dst_tree, src_tree, &modules)
        })
    }

    /// Replace a datastore's content with a caller-supplied tree.
    pub fn replace_config(
        &self,
        module: Option<&str>,
        src: DataTree,
        dst: DatastoreKind,
    ) -> Result<()> {
        self.run(|| {
            if !dst.is_editable() {
                return Err(StoreError::Unsupported(format!(
                    "datastore {dst} cannot be written"
                )));
            }
            let modules = self.module_set(module)?;
            self.check_write_access(&modules)?;
            let mut dst_tree = DataTree::new();
            for m in &modules {
                let to = self.conn.shared.plugin_for(m, dst)?.load(m, dst)?;
                dst_tree.roots.extend(to.roots);
            }
            self.commit_replacement(dst, dst_tree, src, &modules)
        })
    }

    fn commit_replacement(
        &self,
        dst: DatastoreKind,
        old: DataTree,
        new: DataTree,
        modules: &[String],
    ) -> Result<()> {
        let ctx = self.conn.shared.context();
        for module in modules {
            validate_module(&new, &ctx, module)?;
        }
        let event_id = self.conn.shared.main.lock().next_event_id();
        let orchestrator = Orchestrator {
            locks: &self.conn.shared.locks,
            registry: &self.conn.shared.registry,
            rings: &self.conn.shared.rings,
            ctx: &ctx,
            plugins: &*self.conn.shared,
            ack_timeout: self.conn.shared.config.apply_timeout,
        };
        orchestrator.apply(CommitRequest {
            event_id,
            ds: dst,
            session: Some(self.id),
            nc_id: self.nc_id(),
            old,
            new,
        })?;
        for module in modules {
            self.conn.invalidate_cache(module);
        }
        Ok(())
    }

    // --- locking -----------------------------------------------------------

    /// Take the ds-lock on one module, or on every installed module when
    /// `module` is `None`. The whole-datastore form is atomic: on the
    /// first conflict nothing stays held and the call fails with
    /// *locked*.
    pub fn lock(&self, module: Option<&str>) -> Result<()> {
        self.run(|| match module {
            Some(m) => {
                let ctx = self.conn.shared.context();
                ctx.module(m)?;
                self.conn.shared.locks.ds_lock(m, self.id)
            }
            None => {
                let all = self.conn.shared.context().module_names();
                let mut held: Vec<&String> = Vec::new();
                for m in &all {
                    if let Err(e) = self.conn.shared.locks.ds_lock(m, self.id) {
                        for h in held.into_iter().rev() {
                            let _ = self.conn.shared.locks.ds_unlock(h, self.id);
                        }
                        return Err(e);
                    }
                    held.push(m);
                }
                Ok(())
            }
        })
    }

    /// Release the ds-lock on one module, or on every installed module.
    /// The whole-datastore form requires the session to hold all of them
    /// (*operation failed* otherwise, releasing nothing).
    pub fn unlock(&self, module: Option<&str>) -> Result<()> {
        self.run(|| match module {
            Some(m) => {
                let ctx = self.conn.shared.context();
                ctx.module(m)?;
                self.conn.shared.locks.ds_unlock(m, self.id)
            }
            None => {
                let all = self.conn.shared.context().module_names();
                let holds_all = all
                    .iter()
                    .all(|m| self.conn.shared.locks.ds_holder(m) == Some(self.id));
                if !holds_all {
                    return Err(StoreError::OperationFailed(
                        "session does not hold the whole-datastore lock".to_owned(),
                    ));
                }
                for m in all.iter().rev() {
                    self.conn.shared.locks.ds_unlock(m, self.id)?;
                }
                Ok(())
            }
        })
    }

    // --- subscriptions -----------------------------------------------------

    /// Subscribe to changes of a module (optionally narrowed by xpath).
    pub fn module_change_subscribe(
        &self,
        module: &str,
        xpath: Option<&str>,
        priority: Priority,
        opts: SubscriptionOptions,
        callback: ModuleChangeCb,
        reuse: Option<&SubscriptionGuard>,
    ) -> Result<SubscriptionGuard> {
        self.run(|| {
            let ctx = self.conn.shared.context();
            ctx.module(module)?;
            let handle = self.conn.shared.registry.subscribe(
                module,
                xpath.map(str::to_owned),
                priority,
                opts,
                self.id,
                SubscriberKind::ModuleChange(Arc::clone(&callback)),
                reuse.map(SubscriptionGuard::handle),
            );
            if opts.contains(SubscriptionOptions::ENABLED) {
                // One-shot synthetic done carrying the current content as
                // creates, so the subscriber initializes its state.
                let current = self.load_tree(module)?;
                let diff = compute_diff(&DataTree::new(), &current, &ctx);
                let filtered = match xpath {
                    Some(prefix) => Diff {
                        changes: diff.iter_matching(prefix).cloned().collect(),
                    },
                    None => diff,
                };
                let outcome = callback(&ModuleChangeEvent {
                    event_id: ystore_types::EventId::NONE,
                    phase: EventPhase::Done,
                    module,
                    xpath,
                    diff: &filtered,
                    originator: Some(self.id),
                });
                if let CallbackOutcome::Error(info) = outcome {
                    warn!(module, code = ?info.code, "enabled-sync callback error (ignored)");
                }
            }
            Ok(self.guard(handle))
        })
    }

    /// Register an operational data provider for a subtree.
    pub fn oper_get_subscribe(
        &self,
        module: &str,
        xpath: &str,
        callback: OperGetCb,
        reuse: Option<&SubscriptionGuard>,
    ) -> Result<SubscriptionGuard> {
        self.run(|| {
            let ctx = self.conn.shared.context();
            ctx.module(module)?;
            let handle = self.conn.shared.registry.subscribe(
                module,
                Some(xpath.to_owned()),
                Priority::DEFAULT,
                SubscriptionOptions::DEFAULT,
                self.id,
                SubscriberKind::OperGet(callback),
                reuse.map(SubscriptionGuard::handle),
            );
            Ok(self.guard(handle))
        })
    }

    /// Register an RPC handler.
    pub fn rpc_subscribe(
        &self,
        xpath: &str,
        priority: Priority,
        callback: RpcCb,
        reuse: Option<&SubscriptionGuard>,
    ) -> Result<SubscriptionGuard> {
        self.run(|| {
            let ctx = self.conn.shared.context();
            let path = Path::parse(xpath)?;
            ctx.find_rpc(&path)?;
            let handle = self.conn.shared.registry.subscribe(
                path.module().to_owned(),
                Some(xpath.to_owned()),
                priority,
                SubscriptionOptions::DEFAULT,
                self.id,
                SubscriberKind::Rpc(callback),
                reuse.map(SubscriptionGuard::handle),
            );
            Ok(self.guard(handle))
        })
    }

    /// Send an RPC and wait for the handler's output.
    pub fn rpc_send(&self, xpath: &str, input: &DataTree) -> Result<DataTree> {
        self.run(|| {
            let ctx = self.conn.shared.context();
            dispatch_rpc(&self.conn.shared.registry, &ctx, xpath, input)
        })
    }

    /// Subscribe to notifications; a `start_time` requests replay first.
    pub fn notif_subscribe(
        &self,
        module: &str,
        xpath: Option<&str>,
        start_time: Option<Timestamp>,
        stop_time: Option<Timestamp>,
        callback: NotifCb,
        reuse: Option<&SubscriptionGuard>,
    ) -> Result<SubscriptionGuard> {
        self.run(|| {
            let ctx = self.conn.shared.context();
            ctx.module(module)?;
            let now = Timestamp::now();
            if let (Some(start), Some(stop)) = (start_time, stop_time) {
                if stop < start {
                    return Err(StoreError::invalid_arg(
                        "stop time precedes start time",
                    ));
                }
            }
            if stop_time.is_some() && start_time.is_none() {
                return Err(StoreError::invalid_arg(
                    "stop time requires a start time",
                ));
            }

            let mut window = ReplayWindow::new(stop_time);
            if let Some(start) = start_time {
                let replay_enabled = self
                    .conn
                    .shared
                    .main
                    .lock()
                    .module(module)?
                    .replay_enabled;
                if !replay_enabled {
                    return Err(StoreError::Unsupported(format!(
                        "module \"{module}\" has no replay support"
                    )));
                }
                let plugin = self
                    .conn
                    .shared
                    .plugin_for(module, DatastoreKind::Running)?;
                let entries = plugin.notif_replay_iter(module, Some(start), stop_time)?;
                replay_into(entries, &mut window, now, &callback)?;
            } else {
                // Purely real-time subscriptions skip the replay phase.
                let _ = window.complete_replay(now);
            }

            // Real-time delivery continues through the registry unless the
            // window already closed.
            if window.phase() == ReplayPhase::Stopped {
                return Ok(self.guard(self.conn.shared.registry.subscribe(
                    module,
                    xpath.map(str::to_owned),
                    Priority::DEFAULT,
                    SubscriptionOptions::DEFAULT,
                    self.id,
                    // A stopped window keeps the handle valid but inert.
                    SubscriberKind::Notification(Arc::new(|_, _, _, _| {})),
                    reuse.map(SubscriptionGuard::handle),
                )));
            }
            let gate = Arc::new(Mutex::new(window));
            let inner = Arc::clone(&callback);
            let wrapped: NotifCb = Arc::new(move |kind, xpath, content, ts| {
                // Decide under the lock, call outside it: a callback that
                // itself sends a notification must not deadlock.
                let (deliver, stopped) = {
                    let mut w = gate.lock();
                    let was_stopped = w.phase() == ReplayPhase::Stopped;
                    let deliver = w.classify(ts).is_some();
                    // The stop time may be crossed by this very delivery
                    // (classify moved the window) or by wall clock since
                    // the last one; either way `stop` fires exactly once.
                    let crossed = !was_stopped && w.phase() == ReplayPhase::Stopped;
                    let stopped = crossed || w.check_stop(Timestamp::now());
                    (deliver, stopped)
                };
                if deliver {
                    inner(kind, xpath, content, ts);
                }
                if stopped {
                    inner(
                        ystore_types::NotifKind::Stop,
                        "",
                        &DataTree::new(),
                        Timestamp::now(),
                    );
                }
            });
            Ok(self.guard(self.conn.shared.registry.subscribe(
                module,
                xpath.map(str::to_owned),
                Priority::DEFAULT,
                SubscriptionOptions::DEFAULT,
                self.id,
                SubscriberKind::Notification(wrapped),
                reuse.map(SubscriptionGuard::handle),
            )))
        })
    }

    /// Validate and send a notification; logged for replay when the
    /// module has replay support.
    pub fn notif_send(&self, xpath: &str, content: &DataTree) -> Result<()> {
        self.run(|| {
            let ctx = self.conn.shared.context();
            let now = Timestamp::now();
            let payload =
                send_notification(&self.conn.shared.registry, &ctx, xpath, content, now)?;
            let path = Path::parse(xpath)?;
            let module = path.module().to_owned();
            let replay_enabled = self
                .conn
                .shared
                .main
                .lock()
                .module(&module)?
                .replay_enabled;
            if replay_enabled {
                let plugin = self
                    .conn
                    .shared
                    .plugin_for(&module, DatastoreKind::Running)?;
                plugin.notif_append(&module, now, xpath, &payload)?;
            }
            Ok(())
        })
    }

    /// Remove every subscription filed under a guard without consuming
    /// the guard pattern (explicit early unsubscribe).
    pub fn unsubscribe(&self, guard: SubscriptionGuard) {
        drop(guard);
    }

    // --- internals ---------------------------------------------------------

    fn guard(&self, handle: SubscriptionHandle) -> SubscriptionGuard {
        SubscriptionGuard {
            registry_owner: Arc::clone(&self.conn),
            handle,
            active: true,
        }
    }

    /// Clear the error record, enforce generation pinning, run the
    /// operation, and record its error.
    fn run<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        *self.error.lock() = None;
        if let Err(e) = self.check_generation() {
            *self.error.lock() = Some(e.to_info());
            return Err(e);
        }
        match f() {
            Ok(v) => Ok(v),
            Err(e) => {
                *self.error.lock() = Some(e.to_info());
                Err(e)
            }
        }
    }

    /// Fail with *context changed* once when the generation advanced
    /// under this session; the staged edit is discarded and the session
    /// re-pins to the new generation.
    fn check_generation(&self) -> Result<()> {
        let current = self.conn.shared.context().generation;
        let mut pinned = self.pinned.lock();
        if *pinned == current {
            return Ok(());
        }
        let observed = *pinned;
        *pinned = current;
        self.conn
            .shared
            .active_sessions
            .lock()
            .insert(self.id, current);
        self.edit.lock().clear();
        self.conn.invalidate_all_caches();
        Err(StoreError::ContextChanged {
            observed: observed.get(),
            current: current.get(),
        })
    }

    fn require_editable(&self) -> Result<()> {
        let ds = self.datastore();
        if ds.is_editable() {
            Ok(())
        } else {
            Err(StoreError::Unsupported(format!(
                "datastore {ds} cannot be edited directly"
            )))
        }
    }

    /// The session-visible tree of one module.
    fn load_tree(&self, module: &str) -> Result<DataTree> {
        match self.datastore() {
            DatastoreKind::Operational => {
                let running = self.load_config(module, DatastoreKind::Running)?;
                build_operational(&running, &self.conn.shared.registry, module)
            }
            ds => self.load_config(module, ds),
        }
    }

    fn load_config(&self, module: &str, ds: DatastoreKind) -> Result<DataTree> {
        let plugin = self.conn.shared.plugin_for(module, ds)?;
        if !plugin.access_check(module, &self.user(), false)? {
            return Err(self.unauthorized(module, "read"));
        }
        let use_cache = ds == DatastoreKind::Running
            && self
                .conn
                .options
                .contains(ystore_types::ConnectionOptions::CACHE_RUNNING);
        if use_cache {
            let generation = self.conn.shared.context().generation;
            if let Some((cached_gen, tree)) = self.conn.running_cache.lock().get(module) {
                if *cached_gen == generation {
                    return Ok(tree.clone());
                }
            }
            let tree = plugin.load(module, ds)?;
            self.conn
                .running_cache
                .lock()
                .insert(module.to_owned(), (generation, tree.clone()));
            return Ok(tree);
        }
        plugin.load(module, ds)
    }

    fn load_config_many(&self, modules: &[String]) -> Result<DataTree> {
        let ds = self.datastore();
        let mut combined = DataTree::new();
        for module in modules {
            let tree = self.load_config(module, ds)?;
            combined.roots.extend(tree.roots);
        }
        Ok(combined)
    }

    fn module_set(&self, module: Option<&str>) -> Result<Vec<String>> {
        let ctx = self.conn.shared.context();
        match module {
            Some(m) => {
                ctx.module(m)?;
                Ok(vec![m.to_owned()])
            }
            None => Ok(ctx.module_names()),
        }
    }

    fn check_write_access(&self, modules: &[String]) -> Result<()> {
        let ds = self.datastore();
        for module in modules {
            let plugin = self.conn.shared.plugin_for(module, ds)?;
            if !plugin.access_check(module, &self.user(), true)? {
                return Err(self.unauthorized(module, "write"));
            }
        }
        Ok(())
    }

    fn unauthorized(&self, module: &str, access: &str) -> StoreError {
        StoreError::Unauthorized {
            user: self.user(),
            module: module.to_owned(),
            access: access.to_owned(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.conn.shared.locks.release_session(self.id);
        self.conn.shared.registry.remove_session(self.id);
        self.conn.shared.active_sessions.lock().remove(&self.id);
        let _ = self.conn.shared.try_materialize();
        debug!(id = %self.id, "session stopped");
    }
}

/// Modules a staged edit touches: the edit tree's roots plus move
/// targets.
fn touched_modules(edit: &SessionEdit) -> Result<Vec<String>> {
    let mut modules: Vec<String> = edit.roots.iter().map(|n| n.module.clone()).collect();
    for mv in &edit.moves {
        modules.push(Path::parse(&mv.xpath)?.module().to_owned());
    }
    modules.sort();
    modules.dedup();
    Ok(modules)
}

// ---------------------------------------------------------------------------
// SubscriptionGuard
// ---------------------------------------------------------------------------

/// Owns one subscription handle; dropping it unsubscribes everything
/// filed under the handle.
pub struct SubscriptionGuard {
    registry_owner: Arc<ConnInner>,
    handle: SubscriptionHandle,
    active: bool,
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("handle", &self.handle)
            .field("active", &self.active)
            .finish()
    }
}

impl SubscriptionGuard {
    /// The underlying handle, for `ctx_reuse` registration.
    #[must_use]
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Keep the subscription alive for the rest of the process without
    /// holding the guard.
    pub fn detach(mut self) {
        self.active = false;
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if self.active {
            self.registry_owner.shared.registry.unsubscribe(self.handle);
        }
    }
}

/// Effective uid of this process, from `/proc/self/status`.
fn current_uid() -> Option<u32> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("Uid:"))?;
    // Uid: real effective saved fs
    line.split_whitespace().nth(2)?.parse().ok()
}

fn current_username() -> String {
    std::env::var("USER").unwrap_or_else(|_| "root".to_owned())
}
