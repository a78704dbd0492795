//! Append-only per-module notification replay log.
//!
//! One log file per module (`<module>.ntf`). Records are framed with an
//! explicit length and sealed with an xxh3_64 checksum; entries are never
//! mutated or reordered, and a torn tail (a crash mid-append) is treated
//! as the end of the log rather than corruption.
//!
//! ```text
//! [record 0: 4-byte body length + body + 8-byte checksum]
//! [record 1: ...]
//! ```
//!
//! Body: `timestamp(8) | xpath(4+n) | payload(4+n)`, little-endian.

pub mod log;
pub mod window;

pub use log::{ReplayEntry, ReplayIter, ReplayLog};
pub use window::{ReplayPhase, ReplayWindow};
