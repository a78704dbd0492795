//! Primary error type for yangstore operations.
//!
//! [`StoreError`] carries structured context for each failure class;
//! [`ErrorCode`] is the flat taxonomy returned verbatim across the client
//! boundary. Every `StoreError` maps onto exactly one `ErrorCode`.
//! [`ErrorInfo`] is the per-session error record: one code plus one or more
//! `(message, xpath)` entries, because validation collects every offending
//! node rather than short-circuiting.

use thiserror::Error;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Flat result codes crossing the client boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(u32)]
pub enum ErrorCode {
    /// No error.
    Ok = 0,
    /// Invalid argument.
    InvalidArgument = 1,
    /// Error generated by the schema library.
    SchemaLibrary = 2,
    /// System call or OS resource failure.
    System = 3,
    /// Not enough memory.
    OutOfMemory = 4,
    /// Item not found.
    NotFound = 5,
    /// Item already exists.
    Exists = 6,
    /// Other internal error.
    Internal = 7,
    /// Store initialization failed.
    InitFailed = 8,
    /// Unsupported operation requested.
    Unsupported = 9,
    /// Request names an unknown module.
    UnknownModule = 10,
    /// Unknown element within a known schema.
    BadElement = 11,
    /// Validation of the changes failed.
    ValidationFailed = 12,
    /// An operation failed.
    OperationFailed = 13,
    /// Operation not authorized.
    Unauthorized = 14,
    /// Requested resource is already locked.
    Locked = 15,
    /// Timeout expired.
    Timeout = 16,
    /// A user callback failure caused the operation to fail.
    CallbackFailed = 17,
}

impl ErrorCode {
    /// Static human-readable message for the code.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Ok => "operation succeeded",
            Self::InvalidArgument => "invalid argument",
            Self::SchemaLibrary => "schema library error",
            Self::System => "system function call failed",
            Self::OutOfMemory => "out of memory",
            Self::NotFound => "item not found",
            Self::Exists => "item already exists",
            Self::Internal => "internal error",
            Self::InitFailed => "initialization failed",
            Self::Unsupported => "unsupported operation",
            Self::UnknownModule => "unknown module",
            Self::BadElement => "unknown element in existing schema",
            Self::ValidationFailed => "validation failed",
            Self::OperationFailed => "operation failed",
            Self::Unauthorized => "operation not authorized",
            Self::Locked => "resource already locked",
            Self::Timeout => "timeout expired",
            Self::CallbackFailed => "user callback failed",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Primary error type for yangstore operations.
///
/// Structured variants for common cases; each maps to one [`ErrorCode`]
/// via [`StoreError::code`].
#[derive(Error, Debug)]
pub enum StoreError {
    // === Argument / schema errors ===
    /// A caller-supplied argument is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The schema library rejected an operation.
    #[error("schema library error: {detail}")]
    SchemaLibrary { detail: String },

    /// The request names a module the store does not know.
    #[error("unknown module: {name}")]
    UnknownModule { name: String },

    /// The path names an element the module's schema does not define.
    #[error("unknown element \"{xpath}\" in module {module}")]
    BadElement { module: String, xpath: String },

    /// Instance validation failed; every offending node is collected.
    #[error("validation failed: {}", format_entries(.entries))]
    ValidationFailed { entries: Vec<ErrorEntry> },

    // === Data errors ===
    /// No data exists at the requested path.
    #[error("item not found: {xpath}")]
    NotFound { xpath: String },

    /// Strict create hit an already-existing node.
    #[error("item already exists: {xpath}")]
    Exists { xpath: String },

    // === Concurrency errors ===
    /// The module (or whole datastore) is ds-locked by another session.
    #[error("module \"{module}\" is locked by session {holder}")]
    Locked { module: String, holder: u32 },

    /// An operation did not complete before its deadline.
    #[error("timeout after {after_ms} ms waiting for {waiting_for}")]
    Timeout { after_ms: u64, waiting_for: String },

    /// The schema generation advanced while the session still held the
    /// previous context; the staged edit has been discarded.
    #[error("schema context changed (generation {observed} -> {current})")]
    ContextChanged { observed: u64, current: u64 },

    // === Subscriber errors ===
    /// A verifier callback rejected the change.
    #[error("callback for module \"{module}\" failed: {detail}")]
    CallbackFailed { module: String, detail: String },

    // === Access errors ===
    /// The effective user lacks the required access.
    #[error("user \"{user}\" not authorized for {access} access to module \"{module}\"")]
    Unauthorized {
        user: String,
        module: String,
        access: String,
    },

    // === Infrastructure errors ===
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A shared region is malformed or of an incompatible layout.
    #[error("shared region corrupt: {detail}")]
    RegionCorrupt { detail: String },

    /// Store initialization failed.
    #[error("initialization failed: {detail}")]
    InitFailed { detail: String },

    /// The requested operation is not supported.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A generic operation failure with context.
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// Internal logic error (a bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Render validation entries as `msg (xpath); msg (xpath); ...`.
fn format_entries(entries: &[ErrorEntry]) -> String {
    let parts: Vec<String> = entries
        .iter()
        .map(|e| match &e.xpath {
            Some(xp) => format!("{} ({xp})", e.message),
            None => e.message.clone(),
        })
        .collect();
    parts.join("; ")
}

impl StoreError {
    /// The flat code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::SchemaLibrary { .. } => ErrorCode::SchemaLibrary,
            Self::UnknownModule { .. } => ErrorCode::UnknownModule,
            Self::BadElement { .. } => ErrorCode::BadElement,
            Self::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Exists { .. } => ErrorCode::Exists,
            Self::Locked { .. } => ErrorCode::Locked,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::ContextChanged { .. } => ErrorCode::OperationFailed,
            Self::CallbackFailed { .. } => ErrorCode::CallbackFailed,
            Self::Unauthorized { .. } => ErrorCode::Unauthorized,
            Self::Io(_) | Self::RegionCorrupt { .. } => ErrorCode::System,
            Self::InitFailed { .. } => ErrorCode::InitFailed,
            Self::Unsupported(_) => ErrorCode::Unsupported,
            Self::OperationFailed(_) => ErrorCode::OperationFailed,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether retrying the same operation later can succeed without any
    /// caller-side change.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Locked { .. } | Self::Timeout { .. })
    }

    /// The per-session error record for this error.
    #[must_use]
    pub fn to_info(&self) -> ErrorInfo {
        match self {
            Self::ValidationFailed { entries } => ErrorInfo {
                code: ErrorCode::ValidationFailed,
                entries: entries.clone(),
            },
            other => ErrorInfo {
                code: other.code(),
                entries: vec![ErrorEntry {
                    message: other.to_string(),
                    xpath: None,
                }],
            },
        }
    }

    // --- convenience constructors ---

    /// Invalid-argument error with a formatted message.
    #[must_use]
    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Not-found error for a path.
    #[must_use]
    pub fn not_found(xpath: impl Into<String>) -> Self {
        Self::NotFound {
            xpath: xpath.into(),
        }
    }

    /// Already-exists error for a path.
    #[must_use]
    pub fn exists(xpath: impl Into<String>) -> Self {
        Self::Exists {
            xpath: xpath.into(),
        }
    }

    /// Unknown-module error.
    #[must_use]
    pub fn unknown_module(name: impl Into<String>) -> Self {
        Self::UnknownModule { name: name.into() }
    }

    /// Internal error with a formatted message.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Validation failure from collected entries.
    #[must_use]
    pub fn validation(entries: Vec<ErrorEntry>) -> Self {
        Self::ValidationFailed { entries }
    }
}

// ---------------------------------------------------------------------------
// ErrorInfo
// ---------------------------------------------------------------------------

/// One entry of a session error record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorEntry {
    /// Human-readable message.
    pub message: String,
    /// Path of the node where the problem was discovered, when known.
    pub xpath: Option<String>,
}

impl ErrorEntry {
    #[must_use]
    pub fn new(message: impl Into<String>, xpath: Option<String>) -> Self {
        Self {
            message: message.into(),
            xpath,
        }
    }
}

/// The per-session error record, exposed by `get_error` and cleared at the
/// start of the next operation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub entries: Vec<ErrorEntry>,
}

impl ErrorInfo {
    /// An empty, successful record.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            code: ErrorCode::Ok,
            entries: Vec::new(),
        }
    }

    /// Promote the record back into an error carrying the same code.
    ///
    /// Used when a subscriber's error record crosses the process boundary
    /// and must surface to the caller of `apply_changes` verbatim.
    #[must_use]
    pub fn into_error(self) -> StoreError {
        let message = self
            .entries
            .first()
            .map_or_else(|| self.code.message().to_owned(), |e| e.message.clone());
        match self.code {
            ErrorCode::Ok | ErrorCode::Internal => StoreError::Internal(message),
            ErrorCode::InvalidArgument => StoreError::InvalidArgument(message),
            ErrorCode::SchemaLibrary => StoreError::SchemaLibrary { detail: message },
            ErrorCode::System => StoreError::RegionCorrupt { detail: message },
            ErrorCode::OutOfMemory => StoreError::OperationFailed(message),
            ErrorCode::NotFound => StoreError::NotFound {
                xpath: self
                    .entries
                    .first()
                    .and_then(|e| e.xpath.clone())
                    .unwrap_or(message),
            },
            ErrorCode::Exists => StoreError::Exists {
                xpath: self
                    .entries
                    .first()
                    .and_then(|e| e.xpath.clone())
                    .unwrap_or(message),
            },
            ErrorCode::InitFailed => StoreError::InitFailed { detail: message },
            ErrorCode::Unsupported => StoreError::Unsupported(message),
            ErrorCode::UnknownModule => StoreError::UnknownModule { name: message },
            ErrorCode::BadElement => StoreError::BadElement {
                module: String::new(),
                xpath: message,
            },
            ErrorCode::ValidationFailed => StoreError::ValidationFailed {
                entries: self.entries,
            },
            ErrorCode::OperationFailed => StoreError::OperationFailed(message),
            ErrorCode::Unauthorized => StoreError::Unauthorized {
                user: String::new(),
                module: String::new(),
                access: message,
            },
            ErrorCode::Locked => StoreError::Locked {
                module: message,
                holder: 0,
            },
            ErrorCode::Timeout => StoreError::Timeout {
                after_ms: 0,
                waiting_for: message,
            },
            ErrorCode::CallbackFailed => StoreError::CallbackFailed {
                module: String::new(),
                detail: message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_maps_to_its_code() {
        assert_eq!(
            StoreError::invalid_arg("x").code(),
            ErrorCode::InvalidArgument
        );
        assert_eq!(StoreError::not_found("/m:a").code(), ErrorCode::NotFound);
        assert_eq!(StoreError::exists("/m:a").code(), ErrorCode::Exists);
        assert_eq!(StoreError::unknown_module("m").code(), ErrorCode::UnknownModule);
        assert_eq!(
            StoreError::Locked {
                module: "m".to_owned(),
                holder: 3
            }
            .code(),
            ErrorCode::Locked
        );
        assert_eq!(
            StoreError::Timeout {
                after_ms: 10_000,
                waiting_for: "subscriber acks".to_owned()
            }
            .code(),
            ErrorCode::Timeout
        );
        assert_eq!(
            StoreError::CallbackFailed {
                module: "m".to_owned(),
                detail: "veto".to_owned()
            }
            .code(),
            ErrorCode::CallbackFailed
        );
        assert_eq!(StoreError::internal("bug").code(), ErrorCode::Internal);
    }

    #[test]
    fn transient_errors() {
        assert!(StoreError::Locked {
            module: "m".to_owned(),
            holder: 1
        }
        .is_transient());
        assert!(StoreError::Timeout {
            after_ms: 1,
            waiting_for: "x".to_owned()
        }
        .is_transient());
        assert!(!StoreError::not_found("/m:a").is_transient());
    }

    #[test]
    fn validation_collects_all_entries() {
        let err = StoreError::validation(vec![
            ErrorEntry::new("mandatory node missing", Some("/m:a/b".to_owned())),
            ErrorEntry::new("too few elements", Some("/m:list".to_owned())),
        ]);
        let info = err.to_info();
        assert_eq!(info.code, ErrorCode::ValidationFailed);
        assert_eq!(info.entries.len(), 2);
        let rendered = err.to_string();
        assert!(rendered.contains("mandatory node missing (/m:a/b)"));
        assert!(rendered.contains("too few elements (/m:list)"));
    }

    #[test]
    fn info_from_plain_error_has_one_entry() {
        let info = StoreError::not_found("/m:leaf").to_info();
        assert_eq!(info.code, ErrorCode::NotFound);
        assert_eq!(info.entries.len(), 1);
        assert!(info.entries[0].message.contains("/m:leaf"));
    }

    #[test]
    fn promoted_record_keeps_its_code() {
        for code in [
            ErrorCode::InvalidArgument,
            ErrorCode::NotFound,
            ErrorCode::Exists,
            ErrorCode::ValidationFailed,
            ErrorCode::OperationFailed,
            ErrorCode::Unauthorized,
            ErrorCode::Locked,
            ErrorCode::Timeout,
            ErrorCode::CallbackFailed,
        ] {
            let info = ErrorInfo {
                code,
                entries: vec![ErrorEntry::new("boom", None)],
            };
            assert_eq!(info.into_error().code(), code, "code {code:?} must survive");
        }
    }

    #[test]
    fn io_error_from() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StoreError = io.into();
        assert_eq!(err.code(), ErrorCode::System);
    }

    #[test]
    fn code_values_are_stable() {
        assert_eq!(ErrorCode::Ok as u32, 0);
        assert_eq!(ErrorCode::InvalidArgument as u32, 1);
        assert_eq!(ErrorCode::ValidationFailed as u32, 12);
        assert_eq!(ErrorCode::Locked as u32, 15);
        assert_eq!(ErrorCode::CallbackFailed as u32, 17);
    }
}
