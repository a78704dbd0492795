//! Datastore lock semantics, mirroring the classic lock scenarios:
//! whole-datastore locking is atomic and non-reentrant, per-module locks
//! compose, and reads are never blocked by a ds-lock.

mod common;

use common::store_with_modules;
use ystore::{DatastoreKind, EditOptions, ErrorCode, StoreError, Value};

#[test]
fn one_session_lock_cycle() {
    let f = store_with_modules(&["when1", "when2"]);
    let sess = f.conn.session_start(DatastoreKind::Running).unwrap();

    // Lock all modules.
    sess.lock(None).unwrap();

    // Locking all modules again fails: not reentrant.
    let err = sess.lock(None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Locked);

    // Locking an already-locked module fails too.
    let err = sess.lock(Some("test")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Locked);

    // Unlock all modules.
    sess.unlock(None).unwrap();

    // Lock two individual modules.
    sess.lock(Some("test")).unwrap();
    sess.lock(Some("when1")).unwrap();

    // Unlocking a module that is not locked fails.
    let err = sess.unlock(Some("when2")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::OperationFailed);

    // Locking all modules fails while any is individually held.
    let err = sess.lock(None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Locked);

    // Unlocking all modules fails while the session does not hold all.
    let err = sess.unlock(None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::OperationFailed);

    // Individual unlocks succeed.
    sess.unlock(Some("test")).unwrap();
    sess.unlock(Some("when1")).unwrap();
}

#[test]
fn two_sessions_lock_exclusion_and_reads() {
    let f = store_with_modules(&["when1"]);
    let s1 = f.conn.session_start(DatastoreKind::Running).unwrap();
    let s2 = f.conn.session_start(DatastoreKind::Running).unwrap();

    s1.lock(None).unwrap();

    // The second session cannot take the whole-datastore lock.
    let err = s2.lock(None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Locked);

    // Reads are not blocked by the ds-lock.
    let items = s2.get_items("/test:cont").unwrap();
    assert!(items.is_empty());

    // Applying from the non-holder fails with *locked*.
    s2.set_item("/test:plain", Some(Value::Uint8(1)), EditOptions::DEFAULT)
        .unwrap();
    let err = s2.apply_changes().unwrap_err();
    assert!(matches!(err, StoreError::Locked { .. }));

    s1.unlock(None).unwrap();

    // After unlock the same apply goes through.
    s2.apply_changes().unwrap();
    assert_eq!(
        s2.get_item("/test:plain").unwrap().value,
        Value::Uint8(1)
    );
}

#[test]
fn holder_can_apply_while_locked() {
    let f = store_with_modules(&[]);
    let s1 = f.conn.session_start(DatastoreKind::Running).unwrap();

    s1.lock(Some("test")).unwrap();
    s1.set_item("/test:plain", Some(Value::Uint8(9)), EditOptions::DEFAULT)
        .unwrap();
    s1.apply_changes().unwrap();
    assert_eq!(
        s1.get_item("/test:plain").unwrap().value,
        Value::Uint8(9)
    );
    s1.unlock(Some("test")).unwrap();
}

#[test]
fn session_drop_releases_its_locks() {
    let f = store_with_modules(&[]);
    let s1 = f.conn.session_start(DatastoreKind::Running).unwrap();
    s1.lock(Some("test")).unwrap();
    drop(s1);

    let s2 = f.conn.session_start(DatastoreKind::Running).unwrap();
    s2.lock(Some("test")).unwrap();
    s2.unlock(Some("test")).unwrap();
}

#[test]
fn lock_unknown_module_is_rejected() {
    let f = store_with_modules(&[]);
    let sess = f.conn.session_start(DatastoreKind::Running).unwrap();
    let err = sess.lock(Some("ghost")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnknownModule);
    // The error record is exposed on the session until the next call.
    assert_eq!(sess.get_error().unwrap().code, ErrorCode::UnknownModule);
    sess.get_items("/test:cont").unwrap();
    assert!(sess.get_error().is_none());
}
