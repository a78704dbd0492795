//! Per-repository shared state.
//!
//! Every connection into the same repository directory — from this
//! process or another — shares one [`StoreShared`]: the main metadata
//! region, the lock table, the subscription registry, the ring table, and
//! the plugin set. Within a process the instance is shared through a
//! registry keyed by the repository path; across processes the regions
//! synchronize through their on-disk form.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};
use ystore_commit::PluginResolver;
use ystore_error::{Result, StoreError};
use ystore_plugin::{DatastorePlugin, JsonFilePlugin, MemoryPlugin};
use ystore_shm::{schema_content_hash, DeferredOp, MainRegion, ModuleLockTable, ModuleMeta};
use ystore_subs::{RingTable, SubscriptionRegistry};
use ystore_tree::{SchemaContext, SchemaModule};
use ystore_types::{DatastoreKind, Generation, SessionId};

use crate::config::StoreConfig;

/// Plugin serving `startup` and `running` by default.
const DEFAULT_CONFIG_PLUGIN: &str = "json-file";

/// Plugin serving `operational` by default (never persisted).
const DEFAULT_OPER_PLUGIN: &str = "memory";

pub(crate) struct StoreShared {
    pub config: StoreConfig,
    pub main: Mutex<MainRegion>,
    pub locks: ModuleLockTable,
    pub registry: SubscriptionRegistry,
    pub rings: RingTable,
    plugins: RwLock<HashMap<&'static str, Arc<dyn DatastorePlugin>>>,
    ctx: RwLock<Arc<SchemaContext>>,
    /// Sessions alive in this process and the generation each pinned.
    pub active_sessions: Mutex<HashMap<SessionId, Generation>>,
}

fn stores() -> &'static Mutex<HashMap<PathBuf, Weak<StoreShared>>> {
    static STORES: OnceLock<Mutex<HashMap<PathBuf, Weak<StoreShared>>>> = OnceLock::new();
    STORES.get_or_init(|| Mutex::new(HashMap::new()))
}

impl StoreShared {
    /// Open (or join) the store instance for `config.repo_dir`.
    pub fn open(config: StoreConfig) -> Result<Arc<Self>> {
        let key = config.repo_dir.clone();
        let mut registry = stores().lock();
        if let Some(existing) = registry.get(&key).and_then(Weak::upgrade) {
            return Ok(existing);
        }

        fs::create_dir_all(&config.repo_dir)?;
        let main = MainRegion::create_or_attach(&config.repo_dir)?;

        let mut plugins: HashMap<&'static str, Arc<dyn DatastorePlugin>> = HashMap::new();
        plugins.insert(
            DEFAULT_CONFIG_PLUGIN,
            Arc::new(JsonFilePlugin::new(config.repo_dir.join("data"))),
        );
        plugins.insert(DEFAULT_OPER_PLUGIN, Arc::new(MemoryPlugin::new()));

        let shared = Arc::new(Self {
            config,
            main: Mutex::new(main),
            locks: ModuleLockTable::default(),
            registry: SubscriptionRegistry::new(),
            rings: RingTable::new(),
            plugins: RwLock::new(plugins),
            ctx: RwLock::new(Arc::new(SchemaContext::new(Generation::FIRST))),
            active_sessions: Mutex::new(HashMap::new()),
        });
        shared.rebuild_context()?;
        registry.insert(key, Arc::downgrade(&shared));
        info!(repo = %shared.config.repo_dir.display(), "store opened");
        Ok(shared)
    }

    /// The current schema context.
    pub fn context(&self) -> Arc<SchemaContext> {
        self.ctx.read().clone()
    }

    /// Resolve the plugin serving `(module, ds)` from module metadata.
    pub fn plugin_for(&self, module: &str, ds: DatastoreKind) -> Result<Arc<dyn DatastorePlugin>> {
        let name = {
            let main = self.main.lock();
            main.module(module)?.plugin_for(ds).to_owned()
        };
        self.plugins
            .read()
            .get(name.as_str())
            .map(Arc::clone)
            .ok_or_else(|| StoreError::InitFailed {
                detail: format!("module \"{module}\" references unknown plugin \"{name}\""),
            })
    }

    fn schema_path(&self, module: &str) -> PathBuf {
        self.config.repo_dir.join(format!("{module}.schema.json"))
    }

    /// Rebuild the schema context from the main region and the schema
    /// files next to it.
    pub fn rebuild_context(&self) -> Result<()> {
        let main = self.main.lock();
        let mut ctx = SchemaContext::new(main.generation());
        for meta in main.modules() {
            let text = fs::read_to_string(self.schema_path(&meta.name))?;
            let mut schema: SchemaModule =
                serde_json::from_str(&text).map_err(|e| StoreError::SchemaLibrary {
                    detail: format!("schema for \"{}\" is malformed: {e}", meta.name),
                })?;
            schema.enabled_features = meta.enabled_feature_names();
            ctx.insert_module(schema);
        }
        *self.ctx.write() = Arc::new(ctx);
        debug!(generation = %main.generation(), "schema context rebuilt");
        Ok(())
    }

    /// Pick up a generation advanced by another process.
    pub fn refresh(&self) -> Result<bool> {
        let reloaded = self.main.lock().refresh()?;
        if reloaded {
            self.rebuild_context()?;
        }
        Ok(reloaded)
    }

    /// Queue a schema-affecting operation and materialize it right away
    /// when no live session pins the current generation.
    ///
    /// The operation is validated against the module table plus the
    /// already-queued operations, so a bad request never poisons the
    /// deferred queue.
    pub fn queue_schema_op(&self, op: DeferredOp) -> Result<()> {
        {
            let mut main = self.main.lock();
            validate_op(&main, &op)?;
            main.push_deferred(op)?;
        }
        self.try_materialize()?;
        Ok(())
    }

    /// Drain the deferred queue into a new generation. No-op while any
    /// session still references the current context.
    pub fn try_materialize(&self) -> Result<bool> {
        if !self.active_sessions.lock().is_empty() {
            debug!("deferred schema operations held back by live sessions");
            return Ok(false);
        }
        let mut main = self.main.lock();
        if main.deferred().is_empty() {
            return Ok(false);
        }

        let mut metas: Vec<ModuleMeta> = main.modules().to_vec();
        let ops: Vec<DeferredOp> = main.deferred().to_vec();
        for op in ops {
            match op {
                DeferredOp::Install {
                    name,
                    schema_json,
                    enabled_features,
                } => {
                    if metas.iter().any(|m| m.name == name) {
                        return Err(StoreError::exists(name));
                    }
                    let schema: SchemaModule = serde_json::from_str(&schema_json)
                        .map_err(|e| StoreError::SchemaLibrary {
                            detail: format!("schema for \"{name}\" is malformed: {e}"),
                        })?;
                    fs::write(self.schema_path(&name), &schema_json)?;
                    for plugin in self.plugins.read().values() {
                        plugin.init(&name)?;
                    }
                    let enabled_bits = feature_bits(&schema.features, &enabled_features);
                    metas.push(ModuleMeta {
                        name: name.clone(),
                        revision: schema.revision.clone(),
                        owner: "root".to_owned(),
                        group: "root".to_owned(),
                        perm: 0o600,
                        replay_enabled: false,
                        implemented: true,
                        plugins: [
                            DEFAULT_CONFIG_PLUGIN.to_owned(),
                            DEFAULT_CONFIG_PLUGIN.to_owned(),
                            DEFAULT_OPER_PLUGIN.to_owned(),
                        ],
                        features: schema.features.clone(),
                        enabled_features: enabled_bits,
                        content_hash: schema_content_hash(&schema_json),
                    });
                    info!(module = %name, "module installed");
                }
                DeferredOp::Remove { name } => {
                    if !metas.iter().any(|m| m.name == name) {
                        return Err(StoreError::unknown_module(name));
                    }
                    metas.retain(|m| m.name != name);
                    let _ = fs::remove_file(self.schema_path(&name));
                    for plugin in self.plugins.read().values() {
                        plugin.destroy(&name)?;
                    }
                    info!(module = %name, "module removed");
                }
                DeferredOp::Update { name, schema_json } => {
                    let meta = metas
                        .iter_mut()
                        .find(|m| m.name == name)
                        .ok_or_else(|| StoreError::unknown_module(&name))?;
                    let schema: SchemaModule = serde_json::from_str(&schema_json)
                        .map_err(|e| StoreError::SchemaLibrary {
                            detail: format!("schema for \"{name}\" is malformed: {e}"),
                        })?;
                    fs::write(self.schema_path(&name), &schema_json)?;
                    meta.revision = schema.revision.clone();
                    meta.features = schema.features.clone();
                    meta.content_hash = schema_content_hash(&schema_json);
                    info!(module = %name, "module updated");
                }
                DeferredOp::SetFeature {
                    module,
                    feature,
                    enable,
                } => {
                    let meta = metas
                        .iter_mut()
                        .find(|m| m.name == module)
                        .ok_or_else(|| StoreError::unknown_module(&module))?;
                    let idx = meta
                        .features
                        .iter()
                        .position(|f| *f == feature)
                        .ok_or_else(|| {
                            StoreError::invalid_arg(format!(
                                "module \"{module}\" has no feature \"{feature}\""
                            ))
                        })?;
                    if idx >= 64 {
                        return Err(StoreError::Unsupported(
                            "more than 64 features per module".to_owned(),
                        ));
                    }
                    if enable {
                        meta.enabled_features |= 1 << idx;
                    } else {
                        meta.enabled_features &= !(1 << idx);
                    }
                }
            }
        }
        main.materialize(metas)?;
        drop(main);
        self.rebuild_context()?;
        Ok(true)
    }
}

impl PluginResolver for StoreShared {
    fn resolve(&self, module: &str, ds: DatastoreKind) -> Result<Arc<dyn DatastorePlugin>> {
        self.plugin_for(module, ds)
    }
}

/// Check an operation against the module table and the queue ahead of it.
fn validate_op(main: &MainRegion, op: &DeferredOp) -> Result<()> {
    let installed = |name: &str| -> bool {
        let in_table = main.modules().iter().any(|m| m.name == name);
        let pending_install = main.deferred().iter().any(|d| {
            matches!(d, DeferredOp::Install { name: n, .. } if n == name)
        });
        let pending_remove = main
            .deferred()
            .iter()
            .any(|d| matches!(d, DeferredOp::Remove { name: n } if n == name));
        (in_table || pending_install) && !pending_remove
    };
    match op {
        DeferredOp::Install { name, .. } => {
            if installed(name) {
                return Err(StoreError::exists(name.clone()));
            }
        }
        DeferredOp::Remove { name } | DeferredOp::Update { name, .. } => {
            if !installed(name) {
                return Err(StoreError::unknown_module(name.clone()));
            }
        }
        DeferredOp::SetFeature { module, .. } => {
            if !installed(module) {
                return Err(StoreError::unknown_module(module.clone()));
            }
        }
    }
    Ok(())
}

fn feature_bits(features: &[String], enabled: &[String]) -> u64 {
    let mut bits = 0_u64;
    for (i, f) in features.iter().enumerate().take(64) {
        if enabled.contains(f) {
            bits |= 1 << i;
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use ystore_tree::SchemaNode;
    use ystore_types::ValueKind;

    fn schema(name: &str) -> SchemaModule {
        SchemaModule::new(name, vec![SchemaNode::leaf("x", ValueKind::Bool)])
    }

    fn install(shared: &StoreShared, name: &str) {
        shared
            .queue_schema_op(DeferredOp::Install {
                name: name.to_owned(),
                schema_json: serde_json::to_string(&schema(name)).unwrap(),
                enabled_features: vec![],
            })
            .unwrap();
    }

    #[test]
    fn same_dir_shares_the_instance() {
        let dir = TempDir::new().unwrap();
        let a = StoreShared::open(StoreConfig::at(dir.path())).unwrap();
        let b = StoreShared::open(StoreConfig::at(dir.path())).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn install_materializes_without_sessions() {
        let dir = TempDir::new().unwrap();
        let shared = StoreShared::open(StoreConfig::at(dir.path())).unwrap();
        install(&shared, "test");
        let ctx = shared.context();
        assert!(ctx.modules.contains_key("test"));
        assert_eq!(ctx.generation, Generation::FIRST.next());
    }

    #[test]
    fn live_session_defers_materialization() {
        let dir = TempDir::new().unwrap();
        let shared = StoreShared::open(StoreConfig::at(dir.path())).unwrap();
        shared
            .active_sessions
            .lock()
            .insert(SessionId::new(1).unwrap(), Generation::FIRST);
        install(&shared, "test");
        assert!(!shared.context().modules.contains_key("test"));

        // Session ends; the queue drains.
        shared.active_sessions.lock().clear();
        assert!(shared.try_materialize().unwrap());
        assert!(shared.context().modules.contains_key("test"));
    }

    #[test]
    fn remove_unknown_module_fails() {
        let dir = TempDir::new().unwrap();
        let shared = StoreShared::open(StoreConfig::at(dir.path())).unwrap();
        let err = shared
            .queue_schema_op(DeferredOp::Remove {
                name: "ghost".to_owned(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownModule { .. }));
    }

    #[test]
    fn plugin_resolution_follows_metadata() {
        let dir = TempDir::new().unwrap();
        let shared = StoreShared::open(StoreConfig::at(dir.path())).unwrap();
        install(&shared, "test");
        assert_eq!(
            shared
                .plugin_for("test", DatastoreKind::Running)
                .unwrap()
                .name(),
            "json-file"
        );
        assert_eq!(
            shared
                .plugin_for("test", DatastoreKind::Operational)
                .unwrap()
                .name(),
            "memory"
        );
        assert!(shared.plugin_for("ghost", DatastoreKind::Running).is_err());
    }
}
