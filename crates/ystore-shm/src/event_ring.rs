//! Per-module event ring for cross-process delivery.
//!
//! One ring exists per (module, subscription kind). Producers post an
//! event and wait for the ack bitmap to cover the expected membership;
//! consumers poll for events addressed to their slot, process, and
//! acknowledge with an optional error (a veto during `change`) or an
//! amendment payload (during `update`).
//!
//! Recovery rules:
//!
//! - Event-id fencing: a consumer never sees an event older than its last
//!   acknowledged id, so a partially written slot from a crashed producer
//!   is discarded instead of replayed.
//! - Lease liveness: a consumer whose lease expired is marked
//!   unresponsive, dropped from the expected mask, and evicted at its next
//!   registration check-in. Missing acks surface to the producer as a
//!   timeout, which the orchestrator converts into an abort.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;
use ystore_error::{ErrorInfo, Result, StoreError};
use ystore_types::encoding::{
    append_bytes, append_str, append_u64_le, append_u8, read_bytes, read_str, read_u64_le, read_u8,
};
use ystore_types::{EventId, EventPhase, NetconfSessionId, Priority, SessionId, Timestamp};

/// Maximum consumer slots per ring; the ack bitmap is one `u64`.
pub const MAX_SLOTS: u8 = 64;

/// Default ring capacity (outstanding events).
pub const DEFAULT_CAPACITY: usize = 16;

/// Default consumer lease.
pub const DEFAULT_CONSUMER_LEASE: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// EventRecord
// ---------------------------------------------------------------------------

/// One event as carried in a ring slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub event_id: EventId,
    pub phase: EventPhase,
    pub module: String,
    pub priority: Priority,
    pub originator: Option<SessionId>,
    pub originator_nc: NetconfSessionId,
    pub timestamp: Timestamp,
    /// Serialized change set, RPC input, or notification.
    pub payload: Vec<u8>,
}

impl EventRecord {
    /// Serialize with a trailing xxh3_64 checksum.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        append_u64_le(&mut buf, self.event_id.get());
        append_u8(&mut buf, self.phase.to_u8());
        append_str(&mut buf, &self.module);
        append_u64_le(&mut buf, u64::from(self.priority.get()));
        append_u64_le(
            &mut buf,
            u64::from(self.originator.map_or(0, SessionId::get)),
        );
        append_u64_le(&mut buf, u64::from(self.originator_nc.0));
        append_u64_le(&mut buf, self.timestamp.as_nanos());
        append_bytes(&mut buf, &self.payload);
        let checksum = xxh3_64(&buf);
        append_u64_le(&mut buf, checksum);
        buf
    }

    /// Decode and verify a serialized record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(corrupt("event record shorter than its checksum"));
        }
        let (body, tail) = bytes.split_at(bytes.len() - 8);
        let stored = u64::from_le_bytes(tail.try_into().expect("checksum tail is 8 bytes"));
        if xxh3_64(body) != stored {
            return Err(corrupt("event record checksum mismatch"));
        }

        let mut c = 0;
        let event_id = EventId::new(
            read_u64_le(body, &mut c).ok_or_else(|| corrupt("truncated event id"))?,
        );
        let phase_raw = read_u8(body, &mut c).ok_or_else(|| corrupt("truncated phase"))?;
        let phase = EventPhase::from_u8(phase_raw)
            .ok_or_else(|| corrupt("unknown event phase"))?;
        let module = read_str(body, &mut c)
            .ok_or_else(|| corrupt("truncated module name"))?
            .to_owned();
        let priority = Priority::new(
            u32::try_from(read_u64_le(body, &mut c).ok_or_else(|| corrupt("truncated priority"))?)
                .map_err(|_| corrupt("priority out of range"))?,
        );
        let originator_raw =
            read_u64_le(body, &mut c).ok_or_else(|| corrupt("truncated originator"))?;
        let originator = u32::try_from(originator_raw)
            .ok()
            .and_then(SessionId::new);
        let nc_raw = read_u64_le(body, &mut c).ok_or_else(|| corrupt("truncated nc id"))?;
        let originator_nc = NetconfSessionId(u32::try_from(nc_raw).unwrap_or(0));
        let timestamp = Timestamp::from_nanos(
            read_u64_le(body, &mut c).ok_or_else(|| corrupt("truncated timestamp"))?,
        );
        let payload = read_bytes(body, &mut c)
            .ok_or_else(|| corrupt("truncated payload"))?
            .to_vec();
        Ok(Self {
            event_id,
            phase,
            module,
            priority,
            originator,
            originator_nc,
            timestamp,
            payload,
        })
    }
}

fn corrupt(detail: &str) -> StoreError {
    StoreError::RegionCorrupt {
        detail: detail.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Acks
// ---------------------------------------------------------------------------

/// One consumer's response to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckResult {
    pub slot: u8,
    /// A veto (during `change`) or a logged-only failure (`done`/`abort`).
    pub error: Option<ErrorInfo>,
    /// A supplemental edit returned during the `update` phase, serialized.
    pub amendment: Option<Vec<u8>>,
}

#[derive(Debug)]
struct PostedEvent {
    record: EventRecord,
    expected_mask: u64,
    ack_mask: u64,
    results: Vec<AckResult>,
}

#[derive(Debug, Clone, Copy)]
struct SlotState {
    pid: u32,
    lease_expiry: Instant,
    last_acked: u64,
    unresponsive: bool,
}

// ---------------------------------------------------------------------------
// EventRing
// ---------------------------------------------------------------------------

struct RingInner {
    events: VecDeque<PostedEvent>,
    roster: [Option<SlotState>; MAX_SLOTS as usize],
    lease: Duration,
}

/// A bounded event channel with acknowledgement tracking.
pub struct EventRing {
    inner: Mutex<RingInner>,
    cond: Condvar,
    capacity: usize,
}

impl Default for EventRing {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_CONSUMER_LEASE)
    }
}

impl EventRing {
    #[must_use]
    pub fn new(capacity: usize, lease: Duration) -> Self {
        Self {
            inner: Mutex::new(RingInner {
                events: VecDeque::new(),
                roster: [None; MAX_SLOTS as usize],
                lease,
            }),
            cond: Condvar::new(),
            capacity,
        }
    }

    /// Register a consumer; returns its slot bit. Evicts unresponsive
    /// corpses first, so a restarted consumer can re-register.
    pub fn register(&self, pid: u32) -> Result<u8> {
        let mut inner = self.inner.lock();
        let lease = inner.lease;
        let now = Instant::now();
        for slot in &mut inner.roster {
            if slot.is_some_and(|s| s.unresponsive || now >= s.lease_expiry) {
                *slot = None;
            }
        }
        let bit = inner
            .roster
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| {
                StoreError::Unsupported(format!(
                    "event ring is full ({MAX_SLOTS} consumer slots)"
                ))
            })?;
        inner.roster[bit] = Some(SlotState {
            pid,
            lease_expiry: now + lease,
            last_acked: 0,
            unresponsive: false,
        });
        debug!(bit, pid, "registered event-ring consumer");
        Ok(u8::try_from(bit).expect("roster has at most 64 slots"))
    }

    /// Remove a consumer and drop it from every outstanding expectation,
    /// waking any producer currently waiting on its ack.
    pub fn unregister(&self, bit: u8) {
        let mut inner = self.inner.lock();
        inner.roster[bit as usize] = None;
        for ev in &mut inner.events {
            ev.expected_mask &= !(1 << bit);
        }
        drop(inner);
        self.cond.notify_all();
    }

    /// Renew a consumer's lease.
    pub fn heartbeat(&self, bit: u8) {
        let mut inner = self.inner.lock();
        let lease = inner.lease;
        if let Some(slot) = &mut inner.roster[bit as usize] {
            slot.lease_expiry = Instant::now() + lease;
        }
    }

    /// The mask of live, responsive consumers.
    #[must_use]
    pub fn live_mask(&self) -> u64 {
        let inner = self.inner.lock();
        let now = Instant::now();
        let mut mask = 0_u64;
        for (i, slot) in inner.roster.iter().enumerate() {
            if slot.is_some_and(|s| !s.unresponsive && now < s.lease_expiry) {
                mask |= 1 << i;
            }
        }
        mask
    }

    /// Post an event expecting acks from `expected_mask`. Blocks while the
    /// ring is at capacity.
    pub fn post(&self, record: EventRecord, expected_mask: u64, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.events.len() >= self.capacity {
            if self.cond.wait_until(&mut inner, deadline).timed_out() {
                return Err(StoreError::Timeout {
                    after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    waiting_for: "free event-ring slot".to_owned(),
                });
            }
        }
        debug!(
            event = %record.event_id,
            phase = %record.phase,
            module = %record.module,
            expected = format_args!("{expected_mask:#x}"),
            "posted event"
        );
        inner.events.push_back(PostedEvent {
            record,
            expected_mask,
            ack_mask: 0,
            results: Vec::new(),
        });
        drop(inner);
        self.cond.notify_all();
        Ok(())
    }

    /// Wait until every expected consumer acknowledged `event_id`.
    ///
    /// On timeout, consumers that never answered are marked unresponsive
    /// (evicted at their next check-in) and the caller gets *timeout*.
    pub fn wait_acks(&self, event_id: EventId, timeout: Duration) -> Result<Vec<AckResult>> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            // Reap dead consumers out of the expectation first.
            let now = Instant::now();
            let mut dead_mask = 0_u64;
            for (i, slot) in inner.roster.iter_mut().enumerate() {
                if let Some(s) = slot {
                    if now >= s.lease_expiry {
                        s.unresponsive = true;
                        dead_mask |= 1 << i;
                    }
                }
            }
            if dead_mask != 0 {
                for ev in &mut inner.events {
                    ev.expected_mask &= !dead_mask;
                }
            }

            let Some(idx) = inner
                .events
                .iter()
                .position(|e| e.record.event_id == event_id)
            else {
                return Err(StoreError::internal(format!(
                    "waiting for acks on unknown event {event_id}"
                )));
            };
            let ev = &inner.events[idx];
            if ev.ack_mask & ev.expected_mask == ev.expected_mask {
                let results = ev.results.clone();
                inner.events.remove(idx);
                drop(inner);
                self.cond.notify_all();
                return Ok(results);
            }
            if self.cond.wait_until(&mut inner, deadline).timed_out() {
                let ev = &mut inner.events[idx];
                let missing = ev.expected_mask & !ev.ack_mask;
                warn!(
                    event = %event_id,
                    missing = format_args!("{missing:#x}"),
                    "ack wait timed out; marking unresponsive"
                );
                for (i, slot) in inner.roster.iter_mut().enumerate() {
                    if missing & (1 << i) != 0 {
                        if let Some(s) = slot {
                            s.unresponsive = true;
                        }
                    }
                }
                inner.events.remove(idx);
                return Err(StoreError::Timeout {
                    after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    waiting_for: format!("subscriber acks for event {event_id}"),
                });
            }
        }
    }

    /// Fetch the next event addressed to `bit` that it has not yet
    /// acknowledged. Events at or below the consumer's last-acked id are
    /// fenced off and never returned.
    pub fn next_event(&self, bit: u8, timeout: Duration) -> Option<EventRecord> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            let fence = inner.roster[bit as usize].map_or(0, |s| s.last_acked);
            let found = inner.events.iter().find_map(|e| {
                let addressed = e.expected_mask & (1 << bit) != 0;
                let unacked = e.ack_mask & (1 << bit) == 0;
                let fresh = e.record.event_id.get() > fence;
                (addressed && unacked && fresh).then(|| e.record.clone())
            });
            if found.is_some() {
                return found;
            }
            if self.cond.wait_until(&mut inner, deadline).timed_out() {
                return None;
            }
        }
    }

    /// Acknowledge an event from consumer `bit`.
    pub fn ack(
        &self,
        event_id: EventId,
        bit: u8,
        error: Option<ErrorInfo>,
        amendment: Option<Vec<u8>>,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let lease = inner.lease;
        let Some(ev) = inner
            .events
            .iter_mut()
            .find(|e| e.record.event_id == event_id)
        else {
            // The producer already gave up on this event (timeout); the
            // late ack is dropped, not an error for the consumer.
            return Ok(());
        };
        if ev.ack_mask & (1 << bit) != 0 {
            return Err(StoreError::OperationFailed(format!(
                "slot {bit} already acknowledged event {event_id}"
            )));
        }
        ev.ack_mask |= 1 << bit;
        ev.results.push(AckResult {
            slot: bit,
            error,
            amendment,
        });
        if let Some(slot) = &mut inner.roster[bit as usize] {
            slot.last_acked = slot.last_acked.max(event_id.get());
            slot.lease_expiry = Instant::now() + lease;
        }
        drop(inner);
        self.cond.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const T: Duration = Duration::from_millis(500);

    fn record(id: u64, phase: EventPhase) -> EventRecord {
        EventRecord {
            event_id: EventId::new(id),
            phase,
            module: "test".to_owned(),
            priority: Priority::new(10),
            originator: SessionId::new(1),
            originator_nc: NetconfSessionId(7),
            timestamp: Timestamp::from_nanos(123_456),
            payload: b"{\"changes\":[]}".to_vec(),
        }
    }

    #[test]
    fn record_wire_roundtrip() {
        let r = record(42, EventPhase::Change);
        let bytes = r.to_bytes();
        assert_eq!(EventRecord::from_bytes(&bytes).unwrap(), r);
    }

    #[test]
    fn record_checksum_detects_flip() {
        let r = record(42, EventPhase::Change);
        let mut bytes = r.to_bytes();
        bytes[10] ^= 0x01;
        assert!(EventRecord::from_bytes(&bytes).is_err());
        assert!(EventRecord::from_bytes(&bytes[..4]).is_err());
    }

    #[test]
    fn post_ack_roundtrip() {
        let ring = Arc::new(EventRing::default());
        let bit = ring.register(1000).unwrap();

        let consumer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let ev = ring.next_event(bit, T).expect("event arrives");
                assert_eq!(ev.phase, EventPhase::Change);
                ring.ack(ev.event_id, bit, None, None).unwrap();
            })
        };

        ring.post(record(1, EventPhase::Change), 1 << bit, T).unwrap();
        let acks = ring.wait_acks(EventId::new(1), T).unwrap();
        consumer.join().unwrap();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].slot, bit);
        assert!(acks[0].error.is_none());
    }

    #[test]
    fn veto_is_carried_in_ack() {
        let ring = Arc::new(EventRing::default());
        let bit = ring.register(1000).unwrap();

        let consumer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let ev = ring.next_event(bit, T).unwrap();
                let veto = ystore_error::StoreError::OperationFailed("refused".to_owned());
                ring.ack(ev.event_id, bit, Some(veto.to_info()), None).unwrap();
            })
        };

        ring.post(record(2, EventPhase::Change), 1 << bit, T).unwrap();
        let acks = ring.wait_acks(EventId::new(2), T).unwrap();
        consumer.join().unwrap();
        assert!(acks[0].error.is_some());
    }

    #[test]
    fn missing_ack_times_out_and_marks_unresponsive() {
        let ring = EventRing::default();
        let bit = ring.register(1000).unwrap();
        ring.post(record(3, EventPhase::Change), 1 << bit, T).unwrap();
        let err = ring.wait_acks(EventId::new(3), Duration::from_millis(50));
        assert!(matches!(err, Err(StoreError::Timeout { .. })));
        // The consumer slot is now unresponsive and excluded from live_mask.
        assert_eq!(ring.live_mask() & (1 << bit), 0);
        // Re-registration reclaims the slot.
        let again = ring.register(1000).unwrap();
        assert_eq!(again, bit);
    }

    #[test]
    fn event_id_fencing_discards_stale() {
        let ring = EventRing::default();
        let bit = ring.register(1000).unwrap();

        ring.post(record(10, EventPhase::Change), 1 << bit, T).unwrap();
        let ev = ring.next_event(bit, T).unwrap();
        ring.ack(ev.event_id, bit, None, None).unwrap();
        ring.wait_acks(EventId::new(10), T).unwrap();

        // An event with an id at or below the consumer's last ack is
        // fenced: never delivered to that slot.
        ring.post(record(9, EventPhase::Change), 1 << bit, T).unwrap();
        assert!(ring.next_event(bit, Duration::from_millis(50)).is_none());
    }

    #[test]
    fn unregister_wakes_waiting_producer() {
        let ring = Arc::new(EventRing::default());
        let bit = ring.register(1000).unwrap();
        ring.post(record(5, EventPhase::Change), 1 << bit, T).unwrap();

        let waiter = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || ring.wait_acks(EventId::new(5), T))
        };
        thread::sleep(Duration::from_millis(50));
        ring.unregister(bit);
        // Expectation shrank to nothing; the producer completes with no acks.
        let acks = waiter.join().unwrap().unwrap();
        assert!(acks.is_empty());
    }

    #[test]
    fn late_ack_after_timeout_is_dropped() {
        let ring = EventRing::default();
        let bit = ring.register(1000).unwrap();
        ring.post(record(6, EventPhase::Change), 1 << bit, T).unwrap();
        let _ = ring.wait_acks(EventId::new(6), Duration::from_millis(30));
        // Event is gone; the ack is silently discarded.
        ring.ack(EventId::new(6), bit, None, None).unwrap();
    }
}
