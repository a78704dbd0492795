//! Notification fan-out and replay delivery.

use tracing::debug;
use ystore_error::{Result, StoreError};
use ystore_replay::ReplayWindow;
use ystore_tree::{DataTree, Path, SchemaContext};
use ystore_types::{NotifKind, Timestamp};

use crate::registry::{SubscriberKind, SubscriptionRegistry};

/// Validate and deliver a real-time notification to every matching
/// in-process subscriber. Returns the serialized payload for replay
/// logging and cross-process posting.
pub fn send_notification(
    registry: &SubscriptionRegistry,
    ctx: &SchemaContext,
    xpath: &str,
    content: &DataTree,
    timestamp: Timestamp,
) -> Result<Vec<u8>> {
    let path = Path::parse(xpath)?;
    ctx.find_notification(&path)?;
    let module = path.module().to_owned();

    let payload = content.serialize()?.into_bytes();
    for sub in registry.notif_subscribers(&module, xpath) {
        let SubscriberKind::Notification(cb) = &sub.kind else {
            continue;
        };
        cb(NotifKind::Realtime, xpath, content, timestamp);
    }
    debug!(xpath, "delivered realtime notification");
    Ok(payload)
}

/// Replay logged notifications into one subscriber callback, driving the
/// window state machine: each entry as `replay`, one `replay_complete`,
/// and `stop` when the window is already closed.
pub fn replay_into(
    entries: impl Iterator<Item = ystore_replay::ReplayEntry>,
    window: &mut ReplayWindow,
    now: Timestamp,
    cb: &crate::registry::NotifCb,
) -> Result<()> {
    for entry in entries {
        let Some(kind) = window.classify(entry.timestamp) else {
            break;
        };
        let content = DataTree::parse(std::str::from_utf8(&entry.payload).map_err(|_| {
            StoreError::RegionCorrupt {
                detail: "replay payload is not UTF-8".to_owned(),
            }
        })?)?;
        cb(kind, &entry.xpath, &content, entry.timestamp);
    }
    for pseudo in window.complete_replay(now) {
        cb(pseudo, "", &DataTree::new(), now);
    }
    Ok(())
}

/// Deliver the `stop` pseudo-event when a real-time subscription's window
/// closed.
pub fn check_stop(window: &mut ReplayWindow, now: Timestamp, cb: &crate::registry::NotifCb) {
    if window.check_stop(now) {
        cb(NotifKind::Stop, "", &DataTree::new(), now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use ystore_replay::ReplayEntry;
    use ystore_tree::{DataNode, SchemaModule, SchemaNode};
    use ystore_types::{Priority, SessionId, SubscriptionOptions, Value, ValueKind};

    fn ctx() -> SchemaContext {
        let mut ctx = SchemaContext::new(ystore_types::Generation::FIRST);
        ctx.insert_module(SchemaModule::new(
            "m",
            vec![SchemaNode::notification(
                "alarm",
                vec![SchemaNode::leaf("severity", ValueKind::Uint8)],
            )],
        ));
        ctx
    }

    fn content(sev: u8) -> DataTree {
        DataTree {
            roots: vec![DataNode::new("m", "severity", Value::Uint8(sev))],
        }
    }

    #[test]
    fn realtime_delivery_to_matching_subscribers() {
        let reg = SubscriptionRegistry::new();
        let seen: Arc<Mutex<Vec<(NotifKind, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        reg.subscribe(
            "m",
            None,
            Priority::DEFAULT,
            SubscriptionOptions::DEFAULT,
            SessionId::new(1).unwrap(),
            SubscriberKind::Notification(Arc::new(move |kind, xpath, _, _| {
                seen2.lock().push((kind, xpath.to_owned()));
            })),
            None,
        );
        send_notification(&reg, &ctx(), "/m:alarm", &content(3), Timestamp::from_nanos(1))
            .unwrap();
        let log = seen.lock();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0], (NotifKind::Realtime, "/m:alarm".to_owned()));
    }

    #[test]
    fn unknown_notification_is_rejected() {
        let reg = SubscriptionRegistry::new();
        assert!(send_notification(
            &reg,
            &ctx(),
            "/m:nope",
            &DataTree::new(),
            Timestamp::from_nanos(1)
        )
        .is_err());
    }

    #[test]
    fn replay_sequence_ends_with_complete() {
        let seen: Arc<Mutex<Vec<NotifKind>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let cb: crate::registry::NotifCb = Arc::new(move |kind, _, _, _| {
            seen2.lock().push(kind);
        });
        let entries = vec![
            ReplayEntry {
                timestamp: Timestamp::from_nanos(10),
                xpath: "/m:alarm".to_owned(),
                payload: content(1).serialize().unwrap().into_bytes(),
            },
            ReplayEntry {
                timestamp: Timestamp::from_nanos(20),
                xpath: "/m:alarm".to_owned(),
                payload: content(2).serialize().unwrap().into_bytes(),
            },
        ];
        let mut window = ReplayWindow::new(None);
        replay_into(
            entries.into_iter(),
            &mut window,
            Timestamp::from_nanos(30),
            &cb,
        )
        .unwrap();
        assert_eq!(
            *seen.lock(),
            vec![NotifKind::Replay, NotifKind::Replay, NotifKind::ReplayComplete]
        );
    }

    #[test]
    fn replay_with_past_stop_time_stops() {
        let seen: Arc<Mutex<Vec<NotifKind>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let cb: crate::registry::NotifCb = Arc::new(move |kind, _, _, _| {
            seen2.lock().push(kind);
        });
        let mut window = ReplayWindow::new(Some(Timestamp::from_nanos(25)));
        replay_into(
            std::iter::empty(),
            &mut window,
            Timestamp::from_nanos(30),
            &cb,
        )
        .unwrap();
        assert_eq!(*seen.lock(), vec![NotifKind::ReplayComplete, NotifKind::Stop]);
    }
}
