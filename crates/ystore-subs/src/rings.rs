//! The table of per-module event rings.
//!
//! One ring per (module, subscription kind). Rings are created lazily on
//! first use and shared by every connection of the store instance; a ring
//! with no registered consumer slots costs nothing on the commit path.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use ystore_shm::EventRing;

/// Which channel of a module a ring carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RingKind {
    ModuleChange,
    Rpc,
    Notification,
    OperGet,
}

/// Lazily allocated rings keyed by module and kind.
#[derive(Default)]
pub struct RingTable {
    rings: Mutex<HashMap<(String, RingKind), Arc<EventRing>>>,
}

impl RingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The ring for `(module, kind)`, created on first access.
    #[must_use]
    pub fn ring(&self, module: &str, kind: RingKind) -> Arc<EventRing> {
        self.rings
            .lock()
            .entry((module.to_owned(), kind))
            .or_insert_with(|| Arc::new(EventRing::default()))
            .clone()
    }

    /// The ring for `(module, kind)` if it was ever created.
    #[must_use]
    pub fn existing(&self, module: &str, kind: RingKind) -> Option<Arc<EventRing>> {
        self.rings
            .lock()
            .get(&(module.to_owned(), kind))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rings_are_shared_per_key() {
        let table = RingTable::new();
        let a = table.ring("m", RingKind::ModuleChange);
        let b = table.ring("m", RingKind::ModuleChange);
        assert!(Arc::ptr_eq(&a, &b));
        let c = table.ring("m", RingKind::Rpc);
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(table.existing("m", RingKind::Rpc).is_some());
        assert!(table.existing("other", RingKind::Rpc).is_none());
    }
}
