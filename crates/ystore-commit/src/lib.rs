//! The five-phase commit orchestrator.
//!
//! `update → change → store → done | abort`:
//!
//! 1. **update** (only when update-subscribers exist): each may return a
//!    supplemental edit; the result is re-merged and re-validated before
//!    anything else happens. A failure here aborts with no external
//!    effect beyond the update subscribers themselves.
//! 2. **change**: verifiers may veto. The first veto moves to abort.
//! 3. **store**: the new tree goes to the datastore plugin, module by
//!    module; a plugin failure rolls already-stored modules back to their
//!    pre-transaction content and aborts.
//! 4. **done**: non-vetoable; errors are logged, never propagated.
//! 5. **abort**: delivered in reverse priority to every subscriber that
//!    received `change` (the vetoer excluded; it has nothing prepared).
//!
//! Locks: the orchestrator takes the upgradable lock on every touched
//! module in deterministic name order (no deadlock between concurrent
//! commits), evaluates the change under it, and upgrades to write just
//! before store. The session-scoped ds-lock is checked up front: a module
//! ds-locked by another session fails the whole commit with *locked*.

pub mod orchestrator;

pub use orchestrator::{CommitOutcome, CommitRequest, Orchestrator, PluginResolver};
