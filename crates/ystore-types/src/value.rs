//! The flat value representation crossing the client boundary.
//!
//! Every YANG-built-in type a data node can carry has a variant here, and
//! every variant round-trips losslessly through its canonical string form:
//! `Value::parse_canonical(kind, &v.canonical()) == Ok(v)`. Decimal64 keeps
//! scaled integer digits instead of a float so equality and round trips are
//! exact.

use std::fmt;

// ---------------------------------------------------------------------------
// Decimal64
// ---------------------------------------------------------------------------

/// A YANG `decimal64`: a 64-bit scaled integer with 1..=18 fraction digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Decimal64 {
    /// Scaled integer value: the real number is `digits / 10^fraction_digits`.
    digits: i64,
    /// Number of digits after the decimal point, 1..=18.
    fraction_digits: u8,
}

impl Decimal64 {
    /// Create a decimal64. Returns `None` when `fraction_digits` is outside
    /// 1..=18.
    #[must_use]
    pub const fn new(digits: i64, fraction_digits: u8) -> Option<Self> {
        if fraction_digits == 0 || fraction_digits > 18 {
            None
        } else {
            Some(Self {
                digits,
                fraction_digits,
            })
        }
    }

    #[must_use]
    pub const fn digits(self) -> i64 {
        self.digits
    }

    #[must_use]
    pub const fn fraction_digits(self) -> u8 {
        self.fraction_digits
    }

    /// Parse the canonical `[-]d+.d+` form. The number of digits after the
    /// point fixes `fraction_digits`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (int_part, frac_part) = s.split_once('.')?;
        if frac_part.is_empty() || frac_part.len() > 18 {
            return None;
        }
        let negative = int_part.starts_with('-');
        let int_digits = int_part.strip_prefix('-').unwrap_or(int_part);
        if int_digits.is_empty()
            || !int_digits.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let fraction_digits = u8::try_from(frac_part.len()).ok()?;
        let sign = if negative { "-" } else { "" };
        let digits: i64 = format!("{sign}{int_digits}{frac_part}").parse().ok()?;
        Self::new(digits, fraction_digits)
    }
}

impl fmt::Display for Decimal64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = 10_i64.pow(u32::from(self.fraction_digits));
        let int = self.digits / scale;
        let frac = (self.digits % scale).unsigned_abs();
        let sign = if self.digits < 0 && int == 0 { "-" } else { "" };
        write!(
            f,
            "{sign}{int}.{frac:0width$}",
            width = self.fraction_digits as usize
        )
    }
}

// ---------------------------------------------------------------------------
// ValueKind
// ---------------------------------------------------------------------------

/// Discriminant of a [`Value`], usable without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ValueKind {
    List,
    Container,
    PresenceContainer,
    LeafEmpty,
    Notification,
    Binary,
    Bits,
    Bool,
    Decimal64,
    Enum,
    IdentityRef,
    InstanceId,
    Int8,
    Int16,
    Int32,
    Int64,
    String,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    AnyXml,
    AnyData,
}

impl ValueKind {
    /// Whether values of this kind carry data (structural kinds do not).
    #[must_use]
    pub const fn has_data(self) -> bool {
        !matches!(
            self,
            Self::List
                | Self::Container
                | Self::PresenceContainer
                | Self::LeafEmpty
                | Self::Notification
        )
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// Data of one element, typed per the schema node it instantiates.
///
/// Structural variants (`List`, `Container`, `PresenceContainer`,
/// `LeafEmpty`, `Notification`) carry no payload. String-backed variants
/// store the canonical lexical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Value {
    /// A list instance; keys live in the node's path predicate.
    List,
    /// A non-presence container.
    Container,
    /// A presence container; its existence is the data.
    PresenceContainer,
    /// A leaf of type `empty`.
    LeafEmpty,
    /// A notification instance.
    Notification,
    /// Base64-encoded binary data.
    Binary(String),
    /// A space-separated set of bit names.
    Bits(String),
    Bool(bool),
    Decimal64(Decimal64),
    /// A name from the enumeration.
    Enum(String),
    /// A reference to an identity, `[module:]name`.
    IdentityRef(String),
    /// An instance-identifier path.
    InstanceId(String),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    String(String),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    /// An opaque XML fragment.
    AnyXml(String),
    /// An opaque data subtree, serialized.
    AnyData(String),
}

impl Value {
    /// The kind discriminant of this value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::List => ValueKind::List,
            Self::Container => ValueKind::Container,
            Self::PresenceContainer => ValueKind::PresenceContainer,
            Self::LeafEmpty => ValueKind::LeafEmpty,
            Self::Notification => ValueKind::Notification,
            Self::Binary(_) => ValueKind::Binary,
            Self::Bits(_) => ValueKind::Bits,
            Self::Bool(_) => ValueKind::Bool,
            Self::Decimal64(_) => ValueKind::Decimal64,
            Self::Enum(_) => ValueKind::Enum,
            Self::IdentityRef(_) => ValueKind::IdentityRef,
            Self::InstanceId(_) => ValueKind::InstanceId,
            Self::Int8(_) => ValueKind::Int8,
            Self::Int16(_) => ValueKind::Int16,
            Self::Int32(_) => ValueKind::Int32,
            Self::Int64(_) => ValueKind::Int64,
            Self::String(_) => ValueKind::String,
            Self::Uint8(_) => ValueKind::Uint8,
            Self::Uint16(_) => ValueKind::Uint16,
            Self::Uint32(_) => ValueKind::Uint32,
            Self::Uint64(_) => ValueKind::Uint64,
            Self::AnyXml(_) => ValueKind::AnyXml,
            Self::AnyData(_) => ValueKind::AnyData,
        }
    }

    /// Whether this is a structural value with no data payload.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        !self.kind().has_data()
    }

    /// The canonical lexical form. Structural values canonicalize to the
    /// empty string.
    #[must_use]
    pub fn canonical(&self) -> String {
        match self {
            Self::List
            | Self::Container
            | Self::PresenceContainer
            | Self::LeafEmpty
            | Self::Notification => String::new(),
            Self::Binary(s)
            | Self::Bits(s)
            | Self::Enum(s)
            | Self::IdentityRef(s)
            | Self::InstanceId(s)
            | Self::String(s)
            | Self::AnyXml(s)
            | Self::AnyData(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Decimal64(d) => d.to_string(),
            Self::Int8(v) => v.to_string(),
            Self::Int16(v) => v.to_string(),
            Self::Int32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::Uint8(v) => v.to_string(),
            Self::Uint16(v) => v.to_string(),
            Self::Uint32(v) => v.to_string(),
            Self::Uint64(v) => v.to_string(),
        }
    }

    /// Parse the canonical lexical form of `kind` back into a value.
    ///
    /// The inverse of [`Value::canonical`] for every kind. Returns `None`
    /// when `s` is not a valid lexical form for `kind`.
    #[must_use]
    pub fn parse_canonical(kind: ValueKind, s: &str) -> Option<Self> {
        let v = match kind {
            ValueKind::List => Self::List,
            ValueKind::Container => Self::Container,
            ValueKind::PresenceContainer => Self::PresenceContainer,
            ValueKind::LeafEmpty => Self::LeafEmpty,
            ValueKind::Notification => Self::Notification,
            ValueKind::Binary => Self::Binary(s.to_owned()),
            ValueKind::Bits => Self::Bits(s.to_owned()),
            ValueKind::Bool => match s {
                "true" => Self::Bool(true),
                "false" => Self::Bool(false),
                _ => return None,
            },
            ValueKind::Decimal64 => Self::Decimal64(Decimal64::parse(s)?),
            ValueKind::Enum => Self::Enum(s.to_owned()),
            ValueKind::IdentityRef => Self::IdentityRef(s.to_owned()),
            ValueKind::InstanceId => Self::InstanceId(s.to_owned()),
            ValueKind::Int8 => Self::Int8(s.parse().ok()?),
            ValueKind::Int16 => Self::Int16(s.parse().ok()?),
            ValueKind::Int32 => Self::Int32(s.parse().ok()?),
            ValueKind::Int64 => Self::Int64(s.parse().ok()?),
            ValueKind::String => Self::String(s.to_owned()),
            ValueKind::Uint8 => Self::Uint8(s.parse().ok()?),
            ValueKind::Uint16 => Self::Uint16(s.parse().ok()?),
            ValueKind::Uint32 => Self::Uint32(s.parse().ok()?),
            ValueKind::Uint64 => Self::Uint64(s.parse().ok()?),
            ValueKind::AnyXml => Self::AnyXml(s.to_owned()),
            ValueKind::AnyData => Self::AnyData(s.to_owned()),
        };
        Some(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// One data element as returned by flat retrieval calls.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Item {
    /// Path identifying the element.
    pub xpath: String,
    /// Typed value of the element.
    pub value: Value,
    /// Set only when the value was implicitly created from a schema
    /// default; any explicit set clears it regardless of the value written.
    pub default: bool,
}

impl Item {
    #[must_use]
    pub fn new(xpath: impl Into<String>, value: Value) -> Self {
        Self {
            xpath: xpath.into(),
            value,
            default: false,
        }
    }
}
