//! Shared vocabulary types for the yangstore workspace.
//!
//! This crate is dependency-light on purpose: identifier newtypes, the flat
//! value representation, option bitsets, and the little-endian encoding
//! helpers used by the shared-region wire formats. Anything that needs an
//! error type lives higher up.

pub mod encoding;
pub mod flags;
pub mod value;

pub use flags::{
    ChangeOperation, ConnectionOptions, EditOptions, EventPhase, LogLevel, MovePosition, NotifKind,
    SubscriptionOptions,
};
pub use value::{Decimal64, Item, Value, ValueKind};

use std::fmt;
use std::num::NonZeroU32;

/// A datastore a session can be bound to.
///
/// Meanings conform to RFC 8342: `startup` is loaded at device boot,
/// `running` is the current intended configuration, `operational` is
/// `running` overlaid with state contributed by operational providers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum DatastoreKind {
    Startup,
    Running,
    Operational,
}

impl DatastoreKind {
    /// All datastore kinds, in wire-discriminant order.
    pub const ALL: [Self; 3] = [Self::Startup, Self::Running, Self::Operational];

    /// Stable wire discriminant.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Startup => 0,
            Self::Running => 1,
            Self::Operational => 2,
        }
    }

    /// Parse a wire discriminant; `None` for unknown values.
    #[must_use]
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Startup),
            1 => Some(Self::Running),
            2 => Some(Self::Operational),
            _ => None,
        }
    }

    /// Whether sessions may stage edits against this datastore.
    ///
    /// `operational` is a read-only overlay; its content changes only
    /// through commits on `running` and provider contributions.
    #[must_use]
    pub const fn is_editable(self) -> bool {
        !matches!(self, Self::Operational)
    }

    /// Lower-case name used in paths and log messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Running => "running",
            Self::Operational => "operational",
        }
    }
}

impl fmt::Display for DatastoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session identifier, unique within one store instance.
///
/// Session ids start at 1; 0 is reserved so a zeroed shared-region slot
/// never aliases a live session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct SessionId(NonZeroU32);

impl SessionId {
    /// Create a session id from a raw u32. Returns `None` for 0.
    #[must_use]
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Raw u32 value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connection identifier, unique within one store instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct ConnectionId(NonZeroU32);

impl ConnectionId {
    #[must_use]
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Orchestrator-assigned identifier carried through every phase of one
/// commit transaction. Monotonic per store; 0 means "no event".
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
pub struct EventId(u64);

impl EventId {
    pub const NONE: Self = Self(0);

    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this is a real event id (non-zero).
    #[must_use]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic counter bumped on every schema-affecting rewrite of the main
/// metadata region. Pins schema-context identity for live sessions: a
/// session that observes generation `g` must fail with *context changed*
/// once the store advances past `g`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
pub struct Generation(u64);

impl Generation {
    /// The first generation a freshly created store starts at.
    pub const FIRST: Self = Self(1);

    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The next generation.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription priority. Higher values are delivered earlier within a
/// module; ties break by registration order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
pub struct Priority(u32);

impl Priority {
    pub const DEFAULT: Self = Self(0);

    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// NETCONF session id an originator session may carry, forwarded to
/// subscribers so they can attribute changes. 0 means unset.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
pub struct NetconfSessionId(pub u32);

impl fmt::Display for NetconfSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Nanoseconds since the Unix epoch. Used by the replay log and event
/// timestamps; kept as a plain newtype so shared-region wire formats can
/// serialize it without `SystemTime` round trips.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Current wall-clock time. Saturates at zero for clocks before the
    /// epoch (which only happens on badly misconfigured hosts).
    #[must_use]
    pub fn now() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self(nanos)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datastore_kind_roundtrip() {
        for kind in DatastoreKind::ALL {
            assert_eq!(DatastoreKind::from_u8(kind.to_u8()), Some(kind));
        }
        assert_eq!(DatastoreKind::from_u8(200), None);
    }

    #[test]
    fn operational_is_not_editable() {
        assert!(DatastoreKind::Startup.is_editable());
        assert!(DatastoreKind::Running.is_editable());
        assert!(!DatastoreKind::Operational.is_editable());
    }

    #[test]
    fn session_id_rejects_zero() {
        assert!(SessionId::new(0).is_none());
        assert_eq!(SessionId::new(7).map(SessionId::get), Some(7));
    }

    #[test]
    fn generation_advances() {
        let g = Generation::FIRST;
        assert_eq!(g.get(), 1);
        assert_eq!(g.next().get(), 2);
    }

    #[test]
    fn event_id_none_is_falsy() {
        assert!(!EventId::NONE.is_some());
        assert!(EventId::new(1).is_some());
    }
}
