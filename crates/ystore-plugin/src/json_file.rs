//! JSON-file datastore plugin.
//!
//! One file per module and datastore under the repository directory
//! (`<module>.<datastore>.json`), written with a temp-file-and-rename so
//! a crash mid-store never leaves a torn datastore. Notifications go to
//! the module's replay log next to the data files.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use ystore_error::{Result, StoreError};
use ystore_replay::{ReplayEntry, ReplayLog};
use ystore_tree::DataTree;
use ystore_types::{DatastoreKind, Timestamp};

use crate::DatastorePlugin;

/// Persists each datastore as a JSON file.
pub struct JsonFilePlugin {
    dir: PathBuf,
}

impl JsonFilePlugin {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn data_path(&self, module: &str, ds: DatastoreKind) -> PathBuf {
        self.dir.join(format!("{module}.{ds}.json"))
    }

    fn log(&self, module: &str) -> Result<ReplayLog> {
        ReplayLog::open(&self.dir, module)
    }
}

impl DatastorePlugin for JsonFilePlugin {
    fn name(&self) -> &'static str {
        "json-file"
    }

    fn init(&self, module: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        debug!(module, dir = %self.dir.display(), "initialized json-file storage");
        Ok(())
    }

    fn destroy(&self, module: &str) -> Result<()> {
        for ds in DatastoreKind::ALL {
            remove_if_present(&self.data_path(module, ds))?;
        }
        self.log(module)?.destroy()
    }

    fn store(&self, module: &str, ds: DatastoreKind, tree: &DataTree) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.data_path(module, ds);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, tree.serialize()?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load(&self, module: &str, ds: DatastoreKind) -> Result<DataTree> {
        match fs::read_to_string(self.data_path(module, ds)) {
            Ok(text) => DataTree::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DataTree::new()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn access_check(&self, module: &str, user: &str, write: bool) -> Result<bool> {
        // File-mode enforcement is delegated to the OS at open time; the
        // policy decision here only rejects the empty user.
        let _ = (module, write);
        Ok(!user.is_empty())
    }

    fn notif_append(
        &self,
        module: &str,
        timestamp: Timestamp,
        xpath: &str,
        payload: &[u8],
    ) -> Result<()> {
        self.log(module)?.append(&ReplayEntry {
            timestamp,
            xpath: xpath.to_owned(),
            payload: payload.to_vec(),
        })
    }

    fn notif_replay_iter(
        &self,
        module: &str,
        t0: Option<Timestamp>,
        t1: Option<Timestamp>,
    ) -> Result<Box<dyn Iterator<Item = ReplayEntry> + Send>> {
        Ok(Box::new(self.log(module)?.iter_range(t0, t1)?))
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::Io(e)),
    }
}
