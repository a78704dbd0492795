//! In-memory datastore plugin.
//!
//! Backs tests and the operational overlay. Access checks always pass;
//! there is no OS identity to check against.

use std::collections::HashMap;

use parking_lot::RwLock;
use ystore_error::Result;
use ystore_replay::ReplayEntry;
use ystore_tree::DataTree;
use ystore_types::{DatastoreKind, Timestamp};

use crate::DatastorePlugin;

#[derive(Default)]
struct ModuleState {
    trees: HashMap<DatastoreKind, DataTree>,
    notifs: Vec<ReplayEntry>,
}

/// Keeps every datastore and the replay log in process memory.
#[derive(Default)]
pub struct MemoryPlugin {
    modules: RwLock<HashMap<String, ModuleState>>,
}

impl MemoryPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DatastorePlugin for MemoryPlugin {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn init(&self, module: &str) -> Result<()> {
        self.modules
            .write()
            .entry(module.to_owned())
            .or_default();
        Ok(())
    }

    fn destroy(&self, module: &str) -> Result<()> {
        self.modules.write().remove(module);
        Ok(())
    }

    fn store(&self, module: &str, ds: DatastoreKind, tree: &DataTree) -> Result<()> {
        self.modules
            .write()
            .entry(module.to_owned())
            .or_default()
            .trees
            .insert(ds, tree.clone());
        Ok(())
    }

    fn load(&self, module: &str, ds: DatastoreKind) -> Result<DataTree> {
        Ok(self
            .modules
            .read()
            .get(module)
            .and_then(|m| m.trees.get(&ds))
            .cloned()
            .unwrap_or_default())
    }

    fn access_check(&self, _module: &str, _user: &str, _write: bool) -> Result<bool> {
        Ok(true)
    }

    fn notif_append(
        &self,
        module: &str,
        timestamp: Timestamp,
        xpath: &str,
        payload: &[u8],
    ) -> Result<()> {
        self.modules
            .write()
            .entry(module.to_owned())
            .or_default()
            .notifs
            .push(ReplayEntry {
                timestamp,
                xpath: xpath.to_owned(),
                payload: payload.to_vec(),
            });
        Ok(())
    }

    fn notif_replay_iter(
        &self,
        module: &str,
        t0: Option<Timestamp>,
        t1: Option<Timestamp>,
    ) -> Result<Box<dyn Iterator<Item = ReplayEntry> + Send>> {
        let entries: Vec<ReplayEntry> = self
            .modules
            .read()
            .get(module)
            .map(|m| {
                m.notifs
                    .iter()
                    .filter(|e| {
                        t0.map_or(true, |t| e.timestamp >= t)
                            && t1.map_or(true, |t| e.timestamp <= t)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(Box::new(entries.into_iter()))
    }
}
