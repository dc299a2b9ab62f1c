//! Partition-filtered insert subscriptions.
//!
//! The in-process source uses this to push newly inserted events:
//! - Each subscription is bound to exactly one partition
//! - Messages travel over a bounded channel
//! - Slow subscribers are dropped with a final `Dropped` message
//!
//! # Example
//!
//! ```ignore
//! let manager = SubscriptionManager::new();
//! let handle = manager.subscribe(SubscriptionConfig::for_partition("proj-1".into()))?;
//!
//! loop {
//!     match handle.recv() {
//!         Ok(FeedMessage::Insert { event }) => println!("Got event: {:?}", event.id),
//!         Ok(FeedMessage::Dropped { reason }) => break,
//!         Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, FeedMessage, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    DEFAULT_BUFFER_SIZE,
};
