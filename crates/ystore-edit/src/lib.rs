//! Edit staging, merge, and diff for yangstore sessions.
//!
//! The pipeline: a session accumulates a [`SessionEdit`], `apply_edit`
//! merges it over the stored tree into a candidate result, validation runs
//! on the result, and [`compute_diff`] classifies what actually changed
//! for subscriber delivery.

pub mod diff;
pub mod edit;
pub mod merge;

pub use diff::{compute_diff, Change, ChangeIter, Diff};
pub use edit::{EditNode, EditOp, MoveOp, SessionEdit};
pub use merge::apply_edit;
