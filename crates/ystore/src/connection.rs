//! Connections.
//!
//! A connection attaches to the store's shared regions and carries the
//! schema context its sessions operate under. All sessions of one
//! connection share that context; when the store's generation advances,
//! the connection rebuilds before any session proceeds.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;
use ystore_error::{Result, StoreError};
use ystore_shm::DeferredOp;
use ystore_tree::{DataTree, SchemaContext, SchemaModule};
use ystore_types::{ConnectionId, ConnectionOptions, DatastoreKind, Generation};

use crate::config::StoreConfig;
use crate::session::Session;
use crate::store::StoreShared;

pub(crate) struct ConnInner {
    pub shared: Arc<StoreShared>,
    pub id: ConnectionId,
    pub app_name: String,
    pub options: ConnectionOptions,
    /// Running-datastore cache, per module, tagged with the generation it
    /// was filled under. Active only with `CACHE_RUNNING`.
    pub running_cache: Mutex<HashMap<String, (Generation, DataTree)>>,
}

impl ConnInner {
    pub fn invalidate_cache(&self, module: &str) {
        self.running_cache.lock().remove(module);
    }

    pub fn invalidate_all_caches(&self) {
        self.running_cache.lock().clear();
    }
}

/// A client connection to a store.
pub struct Connection {
    pub(crate) inner: Arc<ConnInner>,
}

impl Connection {
    /// Connect using the default configuration (environment-resolved
    /// repository directory).
    pub fn connect(app_name: &str, options: ConnectionOptions) -> Result<Self> {
        Self::connect_with(StoreConfig::default(), app_name, options)
    }

    /// Connect to an explicitly configured store.
    pub fn connect_with(
        config: StoreConfig,
        app_name: &str,
        options: ConnectionOptions,
    ) -> Result<Self> {
        let shared = StoreShared::open(config)?;
        // Join whatever generation the store is at, including one another
        // process advanced while we were away.
        shared.refresh()?;
        let id = shared.main.lock().next_connection_id();
        let id = ConnectionId::new(id).ok_or_else(|| StoreError::InitFailed {
            detail: "connection id allocator wrapped".to_owned(),
        })?;
        info!(app = app_name, %id, "connected");
        Ok(Self {
            inner: Arc::new(ConnInner {
                shared,
                id,
                app_name: app_name.to_owned(),
                options,
                running_cache: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Start a session bound to `ds`.
    pub fn session_start(&self, ds: DatastoreKind) -> Result<Session> {
        Session::start(Arc::clone(&self.inner), ds)
    }

    /// The schema context of the current generation.
    #[must_use]
    pub fn context(&self) -> Arc<SchemaContext> {
        self.inner.shared.context()
    }

    /// The connection id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// The application name given at connect.
    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.inner.app_name
    }

    // --- module administration --------------------------------------------

    /// Install a compiled module schema with the given enabled features.
    ///
    /// Deferred until no live session pins the current generation; with no
    /// sessions it takes effect immediately.
    pub fn install_module(&self, schema: &SchemaModule, enabled_features: &[&str]) -> Result<()> {
        let schema_json = serde_json::to_string(schema)
            .map_err(|e| StoreError::SchemaLibrary {
                detail: format!("schema serialization failed: {e}"),
            })?;
        self.inner.shared.queue_schema_op(DeferredOp::Install {
            name: schema.name.clone(),
            schema_json,
            enabled_features: enabled_features.iter().map(|s| (*s).to_owned()).collect(),
        })
    }

    /// Remove a module and its stored data.
    pub fn remove_module(&self, name: &str) -> Result<()> {
        self.inner.invalidate_cache(name);
        self.inner.shared.queue_schema_op(DeferredOp::Remove {
            name: name.to_owned(),
        })
    }

    /// Replace a module's schema with a newer revision.
    pub fn update_module(&self, schema: &SchemaModule) -> Result<()> {
        let schema_json = serde_json::to_string(schema)
            .map_err(|e| StoreError::SchemaLibrary {
                detail: format!("schema serialization failed: {e}"),
            })?;
        self.inner.shared.queue_schema_op(DeferredOp::Update {
            name: schema.name.clone(),
            schema_json,
        })
    }

    /// Drop not-yet-materialized operations queued for a module.
    pub fn cancel_update_module(&self, name: &str) -> Result<()> {
        let dropped = self.inner.shared.main.lock().cancel_deferred(name)?;
        if dropped == 0 {
            return Err(StoreError::OperationFailed(format!(
                "no deferred operation queued for module \"{name}\""
            )));
        }
        Ok(())
    }

    /// Toggle notification replay for a module. Not schema-affecting; no
    /// generation bump.
    pub fn set_module_replay_support(&self, name: &str, enable: bool) -> Result<()> {
        let mut main = self.inner.shared.main.lock();
        main.module(name)?;
        main.update_meta(|mods| {
            if let Some(m) = mods.iter_mut().find(|m| m.name == name) {
                m.replay_enabled = enable;
            }
        })
    }

    /// Set a module's owner, group, and permission bits.
    pub fn set_module_access(
        &self,
        name: &str,
        owner: &str,
        group: &str,
        perm: u32,
    ) -> Result<()> {
        let mut main = self.inner.shared.main.lock();
        main.module(name)?;
        main.update_meta(|mods| {
            if let Some(m) = mods.iter_mut().find(|m| m.name == name) {
                m.owner = owner.to_owned();
                m.group = group.to_owned();
                m.perm = perm;
            }
        })
    }

    /// Read a module's owner, group, and permission bits.
    pub fn get_module_access(&self, name: &str) -> Result<(String, String, u32)> {
        let main = self.inner.shared.main.lock();
        let m = main.module(name)?;
        Ok((m.owner.clone(), m.group.clone(), m.perm))
    }

    /// Enable a feature. Schema-affecting: deferred like install.
    pub fn enable_feature(&self, module: &str, feature: &str) -> Result<()> {
        self.inner.shared.queue_schema_op(DeferredOp::SetFeature {
            module: module.to_owned(),
            feature: feature.to_owned(),
            enable: true,
        })
    }

    /// Disable a feature. Schema-affecting: deferred like install.
    pub fn disable_feature(&self, module: &str, feature: &str) -> Result<()> {
        self.inner.shared.queue_schema_op(DeferredOp::SetFeature {
            module: module.to_owned(),
            feature: feature.to_owned(),
            enable: false,
        })
    }

    /// Disconnect, releasing everything this connection holds. Dropping
    /// the value does the same.
    pub fn disconnect(self) {}
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Sessions hold their own Arc into the shared state and clean up
        // individually; a dangling deferred queue gets one last chance.
        let _ = self.inner.shared.try_materialize();
        info!(id = %self.inner.id, "disconnected");
    }
}
