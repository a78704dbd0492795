//! The datastore plugin boundary.
//!
//! The core never touches bytes directly: every load, store, copy, access
//! check, and notification append goes through a [`DatastorePlugin`]. Two
//! built-ins ship with the store: [`MemoryPlugin`] (tests, the
//! operational overlay) and [`JsonFilePlugin`] (one JSON file per module
//! and datastore under the repository directory).

pub mod json_file;
pub mod memory;

pub use json_file::JsonFilePlugin;
pub use memory::MemoryPlugin;

use ystore_error::Result;
use ystore_replay::ReplayEntry;
use ystore_tree::DataTree;
use ystore_types::{DatastoreKind, Timestamp};

/// A datastore backend for one or more modules.
///
/// Implementations must be safe for concurrent use; the commit
/// orchestrator serializes writes per module through the lock table, but
/// reads run in parallel.
pub trait DatastorePlugin: Send + Sync {
    /// Stable plugin name recorded in module metadata.
    fn name(&self) -> &'static str;

    /// Prepare storage for a newly installed module.
    fn init(&self, module: &str) -> Result<()>;

    /// Drop all storage of a removed module.
    fn destroy(&self, module: &str) -> Result<()>;

    /// Persist `tree` as the content of `(module, ds)`.
    fn store(&self, module: &str, ds: DatastoreKind, tree: &DataTree) -> Result<()>;

    /// Load the content of `(module, ds)`; an empty tree when nothing was
    /// ever stored.
    fn load(&self, module: &str, ds: DatastoreKind) -> Result<DataTree>;

    /// Copy one datastore's content over another within the module.
    fn copy(&self, module: &str, src: DatastoreKind, dst: DatastoreKind) -> Result<()> {
        let tree = self.load(module, src)?;
        self.store(module, dst, &tree)
    }

    /// Whether `user` may access the module. `write` selects the access
    /// class being checked.
    fn access_check(&self, module: &str, user: &str, write: bool) -> Result<bool>;

    /// Reset the plugin's private candidate area (where one exists) from
    /// `running`. The built-ins keep no candidate area; this is a no-op.
    fn candidate_reset(&self, module: &str) -> Result<()> {
        let _ = module;
        Ok(())
    }

    /// Whether `running` differs from `startup` for the module.
    fn running_modified(&self, module: &str) -> Result<bool> {
        let running = self.load(module, DatastoreKind::Running)?;
        let startup = self.load(module, DatastoreKind::Startup)?;
        Ok(running != startup)
    }

    /// Append a notification to the module's replay log.
    fn notif_append(
        &self,
        module: &str,
        timestamp: Timestamp,
        xpath: &str,
        payload: &[u8],
    ) -> Result<()>;

    /// Iterate logged notifications within `[t0, t1]` (inclusive, either
    /// bound open).
    fn notif_replay_iter(
        &self,
        module: &str,
        t0: Option<Timestamp>,
        t1: Option<Timestamp>,
    ) -> Result<Box<dyn Iterator<Item = ReplayEntry> + Send>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ystore_tree::DataNode;
    use ystore_types::Value;

    /// Shared conformance checks run against both built-ins.
    fn exercise(plugin: &dyn DatastorePlugin) {
        plugin.init("test").unwrap();

        // Fresh module loads empty everywhere.
        for ds in DatastoreKind::ALL {
            assert!(plugin.load("test", ds).unwrap().is_empty());
        }
        assert!(!plugin.running_modified("test").unwrap());

        // Store into running, load it back.
        let mut tree = DataTree::new();
        tree.roots
            .push(DataNode::new("test", "leaf", Value::Uint32(7)));
        plugin.store("test", DatastoreKind::Running, &tree).unwrap();
        assert_eq!(plugin.load("test", DatastoreKind::Running).unwrap(), tree);
        assert!(plugin.running_modified("test").unwrap());

        // Copy running over startup.
        plugin
            .copy("test", DatastoreKind::Running, DatastoreKind::Startup)
            .unwrap();
        assert_eq!(plugin.load("test", DatastoreKind::Startup).unwrap(), tree);
        assert!(!plugin.running_modified("test").unwrap());

        // Replay log: append and range-read.
        for ts in [5_u64, 15, 25] {
            plugin
                .notif_append(
                    "test",
                    Timestamp::from_nanos(ts),
                    "/test:alarm",
                    b"payload",
                )
                .unwrap();
        }
        let hits: Vec<u64> = plugin
            .notif_replay_iter(
                "test",
                Some(Timestamp::from_nanos(10)),
                Some(Timestamp::from_nanos(25)),
            )
            .unwrap()
            .map(|e| e.timestamp.as_nanos())
            .collect();
        assert_eq!(hits, vec![15, 25]);

        // Destroy wipes everything.
        plugin.destroy("test").unwrap();
        assert!(plugin
            .load("test", DatastoreKind::Running)
            .unwrap()
            .is_empty());
        assert_eq!(
            plugin.notif_replay_iter("test", None, None).unwrap().count(),
            0
        );
    }

    #[test]
    fn memory_plugin_conformance() {
        exercise(&MemoryPlugin::new());
    }

    #[test]
    fn json_file_plugin_conformance() {
        let dir = tempfile::TempDir::new().unwrap();
        exercise(&JsonFilePlugin::new(dir.path()));
    }
}
