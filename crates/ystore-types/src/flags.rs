//! Option bitsets and small enums crossing the public boundary.
//!
//! Bitsets are plain `u32` newtypes with `const` flag values so they can be
//! OR-ed together and stored verbatim in shared-region slots.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

// ---------------------------------------------------------------------------
// EditOptions
// ---------------------------------------------------------------------------

/// Options overriding the default behaviour of data-manipulation calls.
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
pub struct EditOptions(u32);

impl EditOptions {
    /// Default behaviour: recursive parent creation, non-strict.
    pub const DEFAULT: Self = Self(0);

    /// All parents of the target node must already exist; `set` does not
    /// synthesize them.
    pub const NON_RECURSIVE: Self = Self(1);

    /// `set` requires the target to not exist (NETCONF create);
    /// `delete` requires the target to exist (NETCONF delete).
    pub const STRICT: Self = Self(2);

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }
}

impl BitOr for EditOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EditOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// SubscriptionOptions
// ---------------------------------------------------------------------------

/// Options overriding the default behaviour of subscriptions.
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
pub struct SubscriptionOptions(u32);

impl SubscriptionOptions {
    pub const DEFAULT: Self = Self(0);

    /// File this subscription under an existing handle; one `unsubscribe`
    /// on the handle removes every subscription filed under it.
    pub const CTX_REUSE: Self = Self(1);

    /// The subscriber is a passive watcher: it does not count as an
    /// operational-data provider for the subscribed subtree.
    pub const PASSIVE: Self = Self(2);

    /// The subscriber cannot veto changes; it receives only `done` events.
    pub const DONE_ONLY: Self = Self(4);

    /// Synthesize an initial `done` event carrying the current datastore
    /// content as creates, so the new subscriber can initialize state.
    pub const ENABLED: Self = Self(8);

    /// The subscriber runs before all others for the module and may amend
    /// the pending diff during the `update` phase.
    pub const UPDATE: Self = Self(16);

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }
}

impl BitOr for SubscriptionOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SubscriptionOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// ConnectionOptions
// ---------------------------------------------------------------------------

/// Options overriding default connection handling.
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
pub struct ConnectionOptions(u32);

impl ConnectionOptions {
    pub const DEFAULT: Self = Self(0);

    /// Keep a connection-local cache of the running datastore, invalidated
    /// on commit and on generation change. Speeds up repeated reads for
    /// every session on the connection.
    pub const CACHE_RUNNING: Self = Self(1);

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }
}

impl BitOr for ConnectionOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ---------------------------------------------------------------------------
// MovePosition
// ---------------------------------------------------------------------------

/// Target position for moving a user-ordered list or leaf-list instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MovePosition {
    /// Before the sibling identified by the anchor.
    Before,
    /// After the sibling identified by the anchor.
    After,
    /// First among its siblings; no anchor.
    First,
    /// Last among its siblings; no anchor.
    Last,
}

impl MovePosition {
    /// Whether this position requires a sibling anchor.
    #[must_use]
    pub const fn needs_anchor(self) -> bool {
        matches!(self, Self::Before | Self::After)
    }
}

impl fmt::Display for MovePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Before => "before",
            Self::After => "after",
            Self::First => "first",
            Self::Last => "last",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ChangeOperation
// ---------------------------------------------------------------------------

/// Classification of one entry in a change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ChangeOperation {
    /// The node exists only in the new tree.
    Created,
    /// The node's value differs between old and new.
    Modified,
    /// The node exists only in the old tree.
    Deleted,
    /// A user-ordered sibling changed position; carries an anchor.
    Moved,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Moved => "moved",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// EventPhase
// ---------------------------------------------------------------------------

/// Phase of a module-change transaction as seen by subscriber callbacks.
///
/// Every committed change is announced at least twice: once as `Change`
/// and once as `Done` or `Abort`. `Update` precedes everything and only
/// reaches subscribers registered with the update flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EventPhase {
    /// The diff may still be amended by the subscriber.
    Update,
    /// Verification: the subscriber may veto by returning an error.
    Change,
    /// The change is committed; errors are logged, never propagated.
    Done,
    /// The transaction failed; undo any preparation made during `Change`.
    Abort,
}

impl EventPhase {
    /// Stable wire discriminant for event-ring slots.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Update => 0,
            Self::Change => 1,
            Self::Done => 2,
            Self::Abort => 3,
        }
    }

    /// Parse a wire discriminant; `None` for unknown values.
    #[must_use]
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Update),
            1 => Some(Self::Change),
            2 => Some(Self::Done),
            3 => Some(Self::Abort),
            _ => None,
        }
    }

    /// Whether a subscriber error in this phase aborts the transaction.
    #[must_use]
    pub const fn error_vetoes(self) -> bool {
        matches!(self, Self::Update | Self::Change)
    }
}

impl fmt::Display for EventPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Update => "update",
            Self::Change => "change",
            Self::Done => "done",
            Self::Abort => "abort",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// NotifKind
// ---------------------------------------------------------------------------

/// Kind of a delivered notification event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum NotifKind {
    /// A live notification.
    Realtime,
    /// A notification replayed from the log.
    Replay,
    /// Pseudo-event: the requested replay interval has been fully
    /// delivered.
    ReplayComplete,
    /// Pseudo-event: the subscription's stop time has been reached.
    Stop,
}

impl fmt::Display for NotifKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Realtime => "realtime",
            Self::Replay => "replay",
            Self::ReplayComplete => "replay-complete",
            Self::Stop => "stop",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// LogLevel
// ---------------------------------------------------------------------------

/// Verbosity levels for the logging sinks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum LogLevel {
    /// Do not emit anything.
    None,
    Error,
    Warning,
    Info,
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        };
        f.write_str(s)
    }
}
