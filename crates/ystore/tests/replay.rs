//! Notification delivery and replay windows.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::store_with_modules;
use parking_lot::Mutex;
use ystore::{DataNode, DataTree, DatastoreKind, NotifKind, Timestamp, Value};

fn alarm(severity: u8) -> DataTree {
    DataTree {
        roots: vec![DataNode::new("test", "severity", Value::Uint8(severity))],
    }
}

#[test]
fn realtime_delivery() {
    let f = store_with_modules(&[]);
    let sess = f.conn.session_start(DatastoreKind::Running).unwrap();

    let seen: Arc<Mutex<Vec<(NotifKind, u8)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = sess
        .notif_subscribe(
            "test",
            Some("/test:alarm"),
            None,
            None,
            Arc::new(move |kind, _xpath, content, _ts| {
                let sev = match content.roots.first().map(|n| &n.value) {
                    Some(Value::Uint8(v)) => *v,
                    _ => 0,
                };
                sink.lock().push((kind, sev));
            }),
            None,
        )
        .unwrap();

    sess.notif_send("/test:alarm", &alarm(3)).unwrap();
    assert_eq!(*seen.lock(), vec![(NotifKind::Realtime, 3)]);
}

#[test]
fn replay_window_delivers_and_stops() {
    let f = store_with_modules(&[]);
    f.conn.set_module_replay_support("test", true).unwrap();
    let sess = f.conn.session_start(DatastoreKind::Running).unwrap();

    // Three notifications at t1 < t2 < t3.
    sess.notif_send("/test:alarm", &alarm(1)).unwrap();
    thread::sleep(Duration::from_millis(5));
    let t2 = Timestamp::now();
    thread::sleep(Duration::from_millis(5));
    sess.notif_send("/test:alarm", &alarm(2)).unwrap();
    thread::sleep(Duration::from_millis(5));
    sess.notif_send("/test:alarm", &alarm(3)).unwrap();
    thread::sleep(Duration::from_millis(5));
    let stop = Timestamp::now();

    let seen: Arc<Mutex<Vec<(NotifKind, u8)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = sess
        .notif_subscribe(
            "test",
            Some("/test:alarm"),
            Some(t2),
            Some(stop),
            Arc::new(move |kind, _xpath, content, _ts| {
                let sev = match content.roots.first().map(|n| &n.value) {
                    Some(Value::Uint8(v)) => *v,
                    _ => 0,
                };
                sink.lock().push((kind, sev));
            }),
            None,
        )
        .unwrap();

    // Replays for the window [t2, stop], one replay-complete, then stop
    // (the stop time already passed at subscribe).
    assert_eq!(
        *seen.lock(),
        vec![
            (NotifKind::Replay, 2),
            (NotifKind::Replay, 3),
            (NotifKind::ReplayComplete, 0),
            (NotifKind::Stop, 0),
        ]
    );
}

#[test]
fn replayed_timestamps_are_monotonic() {
    let f = store_with_modules(&[]);
    f.conn.set_module_replay_support("test", true).unwrap();
    let sess = f.conn.session_start(DatastoreKind::Running).unwrap();

    for sev in 1..=5_u8 {
        sess.notif_send("/test:alarm", &alarm(sev)).unwrap();
    }
    let subscribe_time = Timestamp::now();

    let stamps: Arc<Mutex<Vec<Timestamp>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stamps);
    let _sub = sess
        .notif_subscribe(
            "test",
            None,
            Some(Timestamp::from_nanos(1)),
            None,
            Arc::new(move |kind, _, _, ts| {
                if kind == NotifKind::Replay {
                    sink.lock().push(ts);
                }
            }),
            None,
        )
        .unwrap();

    let observed = stamps.lock();
    assert_eq!(observed.len(), 5);
    for pair in observed.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
    // Replayed history never postdates the subscription request.
    assert!(observed.iter().all(|ts| *ts <= subscribe_time));
}

#[test]
fn replay_requires_module_support() {
    let f = store_with_modules(&[]);
    let sess = f.conn.session_start(DatastoreKind::Running).unwrap();
    let err = sess
        .notif_subscribe(
            "test",
            None,
            Some(Timestamp::from_nanos(1)),
            None,
            Arc::new(|_, _, _, _| {}),
            None,
        )
        .unwrap_err();
    assert_eq!(err.code(), ystore::ErrorCode::Unsupported);
}

#[test]
fn stop_before_start_is_invalid() {
    let f = store_with_modules(&[]);
    f.conn.set_module_replay_support("test", true).unwrap();
    let sess = f.conn.session_start(DatastoreKind::Running).unwrap();
    let err = sess
        .notif_subscribe(
            "test",
            None,
            Some(Timestamp::from_nanos(100)),
            Some(Timestamp::from_nanos(50)),
            Arc::new(|_, _, _, _| {}),
            None,
        )
        .unwrap_err();
    assert_eq!(err.code(), ystore::ErrorCode::InvalidArgument);

    // A stop time without a start time is meaningless.
    let err = sess
        .notif_subscribe(
            "test",
            None,
            None,
            Some(Timestamp::from_nanos(50)),
            Arc::new(|_, _, _, _| {}),
            None,
        )
        .unwrap_err();
    assert_eq!(err.code(), ystore::ErrorCode::InvalidArgument);
}

#[test]
fn notification_against_unknown_schema_fails() {
    let f = store_with_modules(&[]);
    let sess = f.conn.session_start(DatastoreKind::Running).unwrap();
    assert!(sess.notif_send("/test:nope", &DataTree::new()).is_err());
    // A data node is not a notification.
    assert!(sess.notif_send("/test:plain", &DataTree::new()).is_err());
}

#[test]
fn replay_then_realtime_transition() {
    let f = store_with_modules(&[]);
    f.conn.set_module_replay_support("test", true).unwrap();
    let sess = f.conn.session_start(DatastoreKind::Running).unwrap();

    sess.notif_send("/test:alarm", &alarm(1)).unwrap();
    thread::sleep(Duration::from_millis(5));

    let seen: Arc<Mutex<Vec<NotifKind>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = sess
        .notif_subscribe(
            "test",
            Some("/test:alarm"),
            Some(Timestamp::from_nanos(1)),
            None,
            Arc::new(move |kind, _, _, _| {
                sink.lock().push(kind);
            }),
            None,
        )
        .unwrap();

    // Caught up; a live send now arrives as realtime.
    sess.notif_send("/test:alarm", &alarm(2)).unwrap();
    assert_eq!(
        *seen.lock(),
        vec![
            NotifKind::Replay,
            NotifKind::ReplayComplete,
            NotifKind::Realtime,
        ]
    );
}
