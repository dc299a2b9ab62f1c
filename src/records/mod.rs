//! In-memory event log.
//!
//! Events are stored in an append-only log with a per-partition index
//! that keeps offsets in feed order for slice-based paging.

mod index;
mod log;

pub use index::PartitionIndex;
pub use log::EventLog;
