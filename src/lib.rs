//! # Threat Feed
//!
//! Client-side synchronization for a live security-event feed. Two consumers
//! share one event source (a paged query plus a push channel of inserts) and
//! follow the selected project as it changes.
//!
//! ## Core Concepts
//!
//! - **Live feed**: bounded, duplicate-free, newest-first buffer merging a
//!   snapshot with pushes
//! - **Paged log**: stable table pages; pushes only raise a "new data" flag
//! - **Subscription slot**: one subscription per activation, released before
//!   the next one is bound
//! - **Tickets**: every fetch result is checked against the request that is
//!   still current before it is applied
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use threat_feed::{FeedConfig, LiveFeedReconciler, MemoryEventSource, PagedLogViewer};
//!
//! let source = Arc::new(MemoryEventSource::new());
//! let config = FeedConfig::default();
//!
//! let mut feed = LiveFeedReconciler::new(Arc::clone(&source), &config)?;
//! let mut table = PagedLogViewer::new(Arc::clone(&source), &config)?;
//!
//! feed.activate(Some("proj-1".into()))?;
//! table.activate(Some("proj-1".into()))?;
//!
//! // Later, on the host's event loop
//! feed.pump();
//! table.pump();
//! if table.has_new_data() {
//!     table.refresh()?;
//! }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod live_feed;
pub mod memory;
pub mod paged_log;
pub mod records;
pub mod source;
pub mod stats;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use config::FeedConfig;
pub use error::{FeedError, Result};
pub use lifecycle::{Admission, Delivery, FetchOutcome, PumpReport, SubscriptionSlot};
pub use live_feed::{LiveFeedReconciler, SnapshotTicket};
pub use memory::MemoryEventSource;
pub use paged_log::{PageTicket, PagedLogViewer, ViewState};
pub use records::{EventLog, PartitionIndex};
pub use source::EventSource;
pub use stats::{ActivityHistogram, FeedStats, HistogramBucket};
pub use subscriptions::{
    DropReason, FeedMessage, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
pub use types::*;
