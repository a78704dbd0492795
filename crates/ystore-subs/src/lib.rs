//! Subscriptions for yangstore: the in-process registry, the operational
//! overlay, RPC dispatch, notification fan-out, and the per-module event
//! ring table that gives cross-process subscribers the same events.

pub mod notif;
pub mod oper;
pub mod registry;
pub mod rings;
pub mod rpc;

pub use notif::{check_stop, replay_into, send_notification};
pub use oper::build_operational;
pub use registry::{
    CallbackOutcome, ModuleChangeCb, ModuleChangeEvent, NotifCb, OperGetCb, RpcCb,
    SubscriberKind, Subscription, SubscriptionHandle, SubscriptionRegistry,
};
pub use rings::{RingKind, RingTable};
