//! Replay subscription window state machine.
//!
//! A replay subscription walks: deliver logged entries from `start_time`,
//! emit one `replay_complete` when caught up, switch to real time unless
//! the stop time already passed, and emit `stop` once `stop_time` is
//! reached. Without a stop time the real-time phase runs until
//! unsubscribe.

use ystore_types::{NotifKind, Timestamp};

/// Where a replay subscription currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayPhase {
    /// Delivering logged entries.
    Replaying,
    /// Caught up; `replay_complete` has been emitted.
    Realtime,
    /// `stop_time` reached; the subscription is finished.
    Stopped,
}

/// Tracks one subscription's progress through replay and real time.
#[derive(Debug, Clone, Copy)]
pub struct ReplayWindow {
    stop_time: Option<Timestamp>,
    phase: ReplayPhase,
}

impl ReplayWindow {
    #[must_use]
    pub fn new(stop_time: Option<Timestamp>) -> Self {
        Self {
            stop_time,
            phase: ReplayPhase::Replaying,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> ReplayPhase {
        self.phase
    }

    #[must_use]
    pub const fn stop_time(&self) -> Option<Timestamp> {
        self.stop_time
    }

    /// Classify one delivery at `now`. Returns the notification kind the
    /// subscriber sees, or `None` when the subscription already stopped.
    pub fn classify(&mut self, now: Timestamp) -> Option<NotifKind> {
        match self.phase {
            ReplayPhase::Stopped => None,
            ReplayPhase::Replaying => Some(NotifKind::Replay),
            ReplayPhase::Realtime => {
                if self.stop_time.is_some_and(|t| now >= t) {
                    self.phase = ReplayPhase::Stopped;
                    None
                } else {
                    Some(NotifKind::Realtime)
                }
            }
        }
    }

    /// The replay iterator is exhausted: emit `replay_complete` and, when
    /// the stop time already passed, `stop` right after.
    ///
    /// Returns the pseudo-events to deliver, in order.
    pub fn complete_replay(&mut self, now: Timestamp) -> Vec<NotifKind> {
        if self.phase != ReplayPhase::Replaying {
            return Vec::new();
        }
        let mut events = vec![NotifKind::ReplayComplete];
        if self.stop_time.is_some_and(|t| now >= t) {
            self.phase = ReplayPhase::Stopped;
            events.push(NotifKind::Stop);
        } else {
            self.phase = ReplayPhase::Realtime;
        }
        events
    }

    /// The stop time passed during the real-time phase: emit `stop`.
    ///
    /// Returns true when the `stop` pseudo-event must be delivered now.
    pub fn check_stop(&mut self, now: Timestamp) -> bool {
        if self.phase == ReplayPhase::Realtime && self.stop_time.is_some_and(|t| now >= t) {
            self.phase = ReplayPhase::Stopped;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(n: u64) -> Timestamp {
        Timestamp::from_nanos(n)
    }

    #[test]
    fn replay_then_realtime_then_stop() {
        let mut w = ReplayWindow::new(Some(ts(100)));
        assert_eq!(w.classify(ts(50)), Some(NotifKind::Replay));
        assert_eq!(w.complete_replay(ts(60)), vec![NotifKind::ReplayComplete]);
        assert_eq!(w.phase(), ReplayPhase::Realtime);
        assert_eq!(w.classify(ts(70)), Some(NotifKind::Realtime));
        // Stop time passes.
        assert!(w.check_stop(ts(100)));
        assert_eq!(w.phase(), ReplayPhase::Stopped);
        assert_eq!(w.classify(ts(110)), None);
    }

    #[test]
    fn stop_time_in_the_past_stops_right_after_replay() {
        let mut w = ReplayWindow::new(Some(ts(100)));
        assert_eq!(
            w.complete_replay(ts(150)),
            vec![NotifKind::ReplayComplete, NotifKind::Stop]
        );
        assert_eq!(w.phase(), ReplayPhase::Stopped);
    }

    #[test]
    fn open_ended_subscription_never_stops() {
        let mut w = ReplayWindow::new(None);
        assert_eq!(w.complete_replay(ts(10)), vec![NotifKind::ReplayComplete]);
        assert!(!w.check_stop(ts(u64::MAX)));
        assert_eq!(w.classify(ts(u64::MAX)), Some(NotifKind::Realtime));
    }

    #[test]
    fn complete_replay_is_one_shot() {
        let mut w = ReplayWindow::new(None);
        assert_eq!(w.complete_replay(ts(10)).len(), 1);
        assert!(w.complete_replay(ts(20)).is_empty());
    }
}
