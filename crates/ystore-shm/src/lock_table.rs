//! Per-module lock table.
//!
//! Three orthogonal lock classes per module:
//!
//! - **read/write**: many readers or one writer, used by reads and the
//!   commit path. Writers take precedence over new readers once queued.
//! - **upgradable read**: at most one holder; coexists with readers, and
//!   can upgrade to write once the readers drain. The commit orchestrator
//!   evaluates a change under it, then upgrades for the store phase.
//! - **ds-lock**: the session-scoped advisory lock behind the public
//!   `lock`/`unlock` API. Honored by `apply_changes` and `copy_config`,
//!   never by reads. Not reentrant: a second attempt by the holder fails
//!   with *locked* like anyone else's.
//!
//! Liveness is a lease contract: every owner records an expiry, and an
//! expired owner is treated as dead. Cleanup marks the lock inconsistent,
//! drops the corpse, and wakes waiters; the next writer must acknowledge
//! the inconsistency by clearing it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};
use ystore_error::{Result, StoreError};
use ystore_types::SessionId;

/// Default owner lease; holders of short-lived module locks never renew.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);

/// Identity of a lock holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId {
    pub pid: u32,
    pub session: Option<SessionId>,
}

impl OwnerId {
    /// An owner for the current process without a session binding.
    #[must_use]
    pub fn process() -> Self {
        Self {
            pid: std::process::id(),
            session: None,
        }
    }

    /// An owner bound to a session in the current process.
    #[must_use]
    pub fn session(session: SessionId) -> Self {
        Self {
            pid: std::process::id(),
            session: Some(session),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Lease {
    owner: OwnerId,
    expiry: Instant,
}

impl Lease {
    fn new(owner: OwnerId, lease: Duration) -> Self {
        Self {
            owner,
            expiry: Instant::now() + lease,
        }
    }

    fn expired(&self, now: Instant) -> bool {
        now >= self.expiry
    }
}

#[derive(Debug, Default)]
struct ModLock {
    readers: Vec<Lease>,
    writer: Option<Lease>,
    upgradable: Option<Lease>,
    ds_holder: Option<Lease>,
    writers_waiting: u32,
    /// Set when an owner died while holding this lock; cleared by the
    /// next writer acknowledging recovery.
    inconsistent: bool,
}

impl ModLock {
    /// Drop expired owners. Returns true when a writer or upgradable
    /// holder died (the lock state may be torn).
    fn reap(&mut self, now: Instant, module: &str) -> bool {
        let mut torn = false;
        let before = self.readers.len();
        self.readers.retain(|l| !l.expired(now));
        if self.readers.len() != before {
            warn!(module, dropped = before - self.readers.len(), "reaped dead readers");
        }
        if self.writer.as_ref().is_some_and(|l| l.expired(now)) {
            warn!(module, "write-lock holder died; marking lock inconsistent");
            self.writer = None;
            torn = true;
        }
        if self.upgradable.as_ref().is_some_and(|l| l.expired(now)) {
            warn!(module, "upgradable holder died; marking lock inconsistent");
            self.upgradable = None;
            torn = true;
        }
        if self.ds_holder.as_ref().is_some_and(|l| l.expired(now)) {
            warn!(module, "ds-lock holder died; releasing");
            self.ds_holder = None;
        }
        if torn {
            self.inconsistent = true;
        }
        torn
    }

    fn can_read(&self) -> bool {
        self.writer.is_none() && self.writers_waiting == 0
    }

    /// Direct write acquisition; an upgradable holder goes through
    /// `upgrade` instead.
    fn can_write(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty() && self.upgradable.is_none()
    }
}

/// The in-memory lock table shared by every connection of one store.
pub struct ModuleLockTable {
    inner: Mutex<HashMap<String, ModLock>>,
    cond: Condvar,
    lease: Duration,
}

impl Default for ModuleLockTable {
    fn default() -> Self {
        Self::new(DEFAULT_LEASE)
    }
}

impl ModuleLockTable {
    #[must_use]
    pub fn new(lease: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            cond: Condvar::new(),
            lease,
        }
    }

    /// Acquire a shared read lock.
    pub fn read_lock(&self, module: &str, owner: OwnerId, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut map = self.inner.lock();
        loop {
            let entry = map.entry(module.to_owned()).or_default();
            entry.reap(Instant::now(), module);
            if entry.can_read() {
                entry.readers.push(Lease::new(owner, self.lease));
                return Ok(());
            }
            if self.cond.wait_until(&mut map, deadline).timed_out() {
                return Err(timeout_err(timeout, module, "read lock"));
            }
        }
    }

    /// Release a shared read lock.
    pub fn read_unlock(&self, module: &str, owner: OwnerId) -> Result<()> {
        let mut map = self.inner.lock();
        let entry = map
            .get_mut(module)
            .ok_or_else(|| not_locked(module, "read"))?;
        let pos = entry
            .readers
            .iter()
            .position(|l| l.owner == owner)
            .ok_or_else(|| not_locked(module, "read"))?;
        entry.readers.remove(pos);
        drop(map);
        self.cond.notify_all();
        Ok(())
    }

    /// Acquire the exclusive write lock. Queued writers block new readers.
    pub fn write_lock(&self, module: &str, owner: OwnerId, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut map = self.inner.lock();
        map.entry(module.to_owned()).or_default().writers_waiting += 1;
        let result = loop {
            let entry = map.entry(module.to_owned()).or_default();
            entry.reap(Instant::now(), module);
            if entry.can_write() {
                entry.writer = Some(Lease::new(owner, self.lease));
                break Ok(());
            }
            if self.cond.wait_until(&mut map, deadline).timed_out() {
                break Err(timeout_err(timeout, module, "write lock"));
            }
        };
        if let Some(entry) = map.get_mut(module) {
            entry.writers_waiting = entry.writers_waiting.saturating_sub(1);
        }
        drop(map);
        self.cond.notify_all();
        result
    }

    /// Release the write lock.
    pub fn write_unlock(&self, module: &str, owner: OwnerId) -> Result<()> {
        let mut map = self.inner.lock();
        let entry = map
            .get_mut(module)
            .ok_or_else(|| not_locked(module, "write"))?;
        match entry.writer {
            Some(l) if l.owner == owner => entry.writer = None,
            _ => return Err(not_locked(module, "write")),
        }
        drop(map);
        self.cond.notify_all();
        Ok(())
    }

    /// Acquire the upgradable read lock (at most one holder; readers may
    /// continue alongside).
    pub fn upgradable_lock(&self, module: &str, owner: OwnerId, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut map = self.inner.lock();
        loop {
            let entry = map.entry(module.to_owned()).or_default();
            entry.reap(Instant::now(), module);
            if entry.writer.is_none() && entry.upgradable.is_none() {
                entry.upgradable = Some(Lease::new(owner, self.lease));
                return Ok(());
            }
            if self.cond.wait_until(&mut map, deadline).timed_out() {
                return Err(timeout_err(timeout, module, "upgradable lock"));
            }
        }
    }

    /// Upgrade the held upgradable lock to the write lock, waiting for
    /// readers to drain.
    pub fn upgrade(&self, module: &str, owner: OwnerId, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut map = self.inner.lock();
        loop {
            let entry = map.entry(module.to_owned()).or_default();
            entry.reap(Instant::now(), module);
            match entry.upgradable {
                Some(l) if l.owner == owner => {}
                _ => {
                    return Err(StoreError::OperationFailed(format!(
                        "upgrade on \"{module}\" without holding the upgradable lock"
                    )))
                }
            }
            if entry.writer.is_none() && entry.readers.is_empty() {
                entry.upgradable = None;
                entry.writer = Some(Lease::new(owner, self.lease));
                return Ok(());
            }
            if self.cond.wait_until(&mut map, deadline).timed_out() {
                return Err(timeout_err(timeout, module, "lock upgrade"));
            }
        }
    }

    /// Release the upgradable lock without upgrading.
    pub fn upgradable_unlock(&self, module: &str, owner: OwnerId) -> Result<()> {
        let mut map = self.inner.lock();
        let entry = map
            .get_mut(module)
            .ok_or_else(|| not_locked(module, "upgradable"))?;
        match entry.upgradable {
            Some(l) if l.owner == owner => entry.upgradable = None,
            _ => return Err(not_locked(module, "upgradable")),
        }
        drop(map);
        self.cond.notify_all();
        Ok(())
    }

    /// Take the session-scoped ds-lock. Never blocks: *locked* when any
    /// session (including the caller) already holds it.
    pub fn ds_lock(&self, module: &str, session: SessionId) -> Result<()> {
        let mut map = self.inner.lock();
        let entry = map.entry(module.to_owned()).or_default();
        entry.reap(Instant::now(), module);
        if let Some(holder) = entry.ds_holder {
            let holder_id = holder.owner.session.map_or(0, SessionId::get);
            return Err(StoreError::Locked {
                module: module.to_owned(),
                holder: holder_id,
            });
        }
        entry.ds_holder = Some(Lease::new(OwnerId::session(session), self.lease));
        debug!(module, %session, "ds-lock acquired");
        Ok(())
    }

    /// Release the ds-lock; *operation failed* when the session does not
    /// hold it.
    pub fn ds_unlock(&self, module: &str, session: SessionId) -> Result<()> {
        let mut map = self.inner.lock();
        let entry = map
            .get_mut(module)
            .ok_or_else(|| ds_not_held(module))?;
        match entry.ds_holder {
            Some(l) if l.owner.session == Some(session) => {
                entry.ds_holder = None;
                debug!(module, %session, "ds-lock released");
                Ok(())
            }
            _ => Err(ds_not_held(module)),
        }
    }

    /// The session currently holding the ds-lock, if any.
    #[must_use]
    pub fn ds_holder(&self, module: &str) -> Option<SessionId> {
        let mut map = self.inner.lock();
        let entry = map.get_mut(module)?;
        entry.reap(Instant::now(), module);
        entry.ds_holder.and_then(|l| l.owner.session)
    }

    /// Renew the lease on every lock `owner` holds (long-running commits).
    pub fn renew(&self, owner: OwnerId) {
        let mut map = self.inner.lock();
        let expiry = Instant::now() + self.lease;
        for entry in map.values_mut() {
            for l in &mut entry.readers {
                if l.owner == owner {
                    l.expiry = expiry;
                }
            }
            for slot in [&mut entry.writer, &mut entry.upgradable, &mut entry.ds_holder] {
                if let Some(l) = slot {
                    if l.owner == owner {
                        l.expiry = expiry;
                    }
                }
            }
        }
    }

    /// Release everything a session holds (session stop, connection drop).
    pub fn release_session(&self, session: SessionId) {
        let owner = OwnerId::session(session);
        let mut map = self.inner.lock();
        for entry in map.values_mut() {
            entry.readers.retain(|l| l.owner != owner);
            if entry.writer.is_some_and(|l| l.owner == owner) {
                entry.writer = None;
            }
            if entry.upgradable.is_some_and(|l| l.owner == owner) {
                entry.upgradable = None;
            }
            if entry
                .ds_holder
                .is_some_and(|l| l.owner.session == Some(session))
            {
                entry.ds_holder = None;
            }
        }
        drop(map);
        self.cond.notify_all();
    }

    /// Whether a module's lock is marked inconsistent after owner death.
    #[must_use]
    pub fn is_inconsistent(&self, module: &str) -> bool {
        self.inner
            .lock()
            .get(module)
            .is_some_and(|e| e.inconsistent)
    }

    /// Acknowledge and clear the inconsistency signal.
    pub fn clear_inconsistent(&self, module: &str) {
        if let Some(entry) = self.inner.lock().get_mut(module) {
            entry.inconsistent = false;
        }
    }
}

fn timeout_err(timeout: Duration, module: &str, what: &str) -> StoreError {
    StoreError::Timeout {
        after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        waiting_for: format!("{what} on module \"{module}\""),
    }
}

fn not_locked(module: &str, class: &str) -> StoreError {
    StoreError::OperationFailed(format!(
        "{class} lock on \"{module}\" is not held by the caller"
    ))
}

fn ds_not_held(module: &str) -> StoreError {
    StoreError::OperationFailed(format!("module \"{module}\" is not ds-locked by this session"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const T: Duration = Duration::from_millis(200);

    fn sid(n: u32) -> SessionId {
        SessionId::new(n).unwrap()
    }

    #[test]
    fn readers_share_writer_excludes() {
        let t = ModuleLockTable::default();
        let r1 = OwnerId::session(sid(1));
        let r2 = OwnerId::session(sid(2));
        t.read_lock("m", r1, T).unwrap();
        t.read_lock("m", r2, T).unwrap();

        let w = OwnerId::session(sid(3));
        assert!(matches!(
            t.write_lock("m", w, Duration::from_millis(30)),
            Err(StoreError::Timeout { .. })
        ));

        t.read_unlock("m", r1).unwrap();
        t.read_unlock("m", r2).unwrap();
        t.write_lock("m", w, T).unwrap();
        // A reader now waits for the writer.
        assert!(matches!(
            t.read_lock("m", r1, Duration::from_millis(30)),
            Err(StoreError::Timeout { .. })
        ));
        t.write_unlock("m", w).unwrap();
    }

    #[test]
    fn queued_writer_blocks_new_readers() {
        let t = Arc::new(ModuleLockTable::default());
        let r1 = OwnerId::session(sid(1));
        t.read_lock("m", r1, T).unwrap();

        let t2 = Arc::clone(&t);
        let writer = thread::spawn(move || {
            let w = OwnerId::session(sid(2));
            t2.write_lock("m", w, Duration::from_secs(2)).unwrap();
            t2.write_unlock("m", w).unwrap();
        });
        // Give the writer time to queue.
        thread::sleep(Duration::from_millis(50));
        // A new reader must wait behind the queued writer.
        let r3 = OwnerId::session(sid(3));
        assert!(matches!(
            t.read_lock("m", r3, Duration::from_millis(30)),
            Err(StoreError::Timeout { .. })
        ));
        t.read_unlock("m", r1).unwrap();
        writer.join().unwrap();
        // Writer done; reads flow again.
        t.read_lock("m", r3, T).unwrap();
        t.read_unlock("m", r3).unwrap();
    }

    #[test]
    fn upgradable_coexists_with_readers_then_upgrades() {
        let t = Arc::new(ModuleLockTable::default());
        let u = OwnerId::session(sid(1));
        let r = OwnerId::session(sid(2));

        t.upgradable_lock("m", u, T).unwrap();
        t.read_lock("m", r, T).unwrap();

        // Second upgradable holder is refused.
        assert!(matches!(
            t.upgradable_lock("m", OwnerId::session(sid(3)), Duration::from_millis(30)),
            Err(StoreError::Timeout { .. })
        ));

        // Upgrade waits for the reader.
        let t2 = Arc::clone(&t);
        let up = thread::spawn(move || t2.upgrade("m", u, Duration::from_secs(2)));
        thread::sleep(Duration::from_millis(50));
        t.read_unlock("m", r).unwrap();
        up.join().unwrap().unwrap();
        t.write_unlock("m", u).unwrap();
    }

    #[test]
    fn ds_lock_is_not_reentrant() {
        let t = ModuleLockTable::default();
        t.ds_lock("m", sid(1)).unwrap();
        // Same session again: locked, like anyone else.
        assert!(matches!(
            t.ds_lock("m", sid(1)),
            Err(StoreError::Locked { holder: 1, .. })
        ));
        assert!(matches!(
            t.ds_lock("m", sid(2)),
            Err(StoreError::Locked { holder: 1, .. })
        ));
        t.ds_unlock("m", sid(1)).unwrap();
        t.ds_lock("m", sid(2)).unwrap();
    }

    #[test]
    fn ds_unlock_requires_holding() {
        let t = ModuleLockTable::default();
        assert!(matches!(
            t.ds_unlock("m", sid(1)),
            Err(StoreError::OperationFailed(_))
        ));
        t.ds_lock("m", sid(1)).unwrap();
        assert!(matches!(
            t.ds_unlock("m", sid(2)),
            Err(StoreError::OperationFailed(_))
        ));
    }

    #[test]
    fn dead_writer_marks_inconsistent_and_resumes() {
        let t = ModuleLockTable::new(Duration::from_millis(20));
        let w = OwnerId::session(sid(1));
        t.write_lock("m", w, T).unwrap();
        // Let the lease expire; the next acquirer reaps the corpse.
        thread::sleep(Duration::from_millis(40));
        let r = OwnerId::session(sid(2));
        t.read_lock("m", r, T).unwrap();
        assert!(t.is_inconsistent("m"));
        t.clear_inconsistent("m");
        assert!(!t.is_inconsistent("m"));
        t.read_unlock("m", r).unwrap();
    }

    #[test]
    fn release_session_frees_everything() {
        let t = ModuleLockTable::default();
        t.ds_lock("a", sid(1)).unwrap();
        t.ds_lock("b", sid(1)).unwrap();
        t.read_lock("a", OwnerId::session(sid(1)), T).unwrap();
        t.release_session(sid(1));
        assert_eq!(t.ds_holder("a"), None);
        assert_eq!(t.ds_holder("b"), None);
        // Writer can proceed immediately.
        t.write_lock("a", OwnerId::session(sid(2)), T).unwrap();
    }
}
