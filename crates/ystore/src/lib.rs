//! yangstore: a shared configuration and operational datastore for
//! YANG-modeled management applications.
//!
//! Multiple processes on one host attach to the same repository
//! directory and see a coherent view of hierarchical configuration data.
//! Clients open a [`Connection`], start [`Session`]s bound to one of the
//! datastores (`startup`, `running`, `operational`), stage edits, and
//! apply them transactionally: every change runs a five-phase pipeline
//! (`update → change → store → done | abort`) across subscribers in this
//! and other processes.
//!
//! ```no_run
//! use ystore::{Connection, StoreConfig};
//! use ystore_types::{ConnectionOptions, DatastoreKind, EditOptions, Value};
//!
//! # fn main() -> ystore_error::Result<()> {
//! let conn = Connection::connect("example-app", ConnectionOptions::DEFAULT)?;
//! let session = conn.session_start(DatastoreKind::Running)?;
//! session.set_item(
//!     "/ietf-interfaces:interfaces/interface[name='eth0']/enabled",
//!     Some(Value::Bool(true)),
//!     EditOptions::DEFAULT,
//! )?;
//! session.apply_changes()?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod log;
mod session;
mod store;

pub use config::{repo_path, StoreConfig, DEFAULT_APPLY_TIMEOUT, DEFAULT_REPO, REPO_ENV};
pub use connection::Connection;
pub use log::{log_set_callback, log_stderr, log_syslog, LogCallback};
pub use session::{Session, SubscriptionGuard};

// The pieces of the lower layers that appear in this crate's signatures.
pub use ystore_edit::{Change, ChangeIter, Diff, EditNode, EditOp, SessionEdit};
pub use ystore_error::{ErrorCode, ErrorEntry, ErrorInfo, Result, StoreError};
pub use ystore_subs::{
    CallbackOutcome, ModuleChangeCb, ModuleChangeEvent, NotifCb, OperGetCb, RpcCb,
};
pub use ystore_tree::{DataNode, DataTree, Path, SchemaModule, SchemaNode, SchemaNodeKind};
pub use ystore_types::{
    ChangeOperation, ConnectionOptions, DatastoreKind, EditOptions, EventPhase, Item, LogLevel,
    MovePosition, NetconfSessionId, NotifKind, Priority, SessionId, SubscriptionOptions,
    Timestamp, Value, ValueKind,
};
