//! Error types for the feed synchronization layer.

use crate::types::PartitionKey;
use thiserror::Error;

/// Main error type for feed operations.
///
/// Errors are `Clone` so components can keep the most recent one on their
/// state surface while also returning it to the caller.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum FeedError {
    #[error("Snapshot fetch failed for {partition}: {reason}")]
    SnapshotFetchFailed {
        partition: PartitionKey,
        reason: String,
    },

    #[error("Page {page} fetch failed for {partition}: {reason}")]
    PageFetchFailed {
        partition: PartitionKey,
        page: u64,
        reason: String,
    },

    #[error("Subscription failed for {partition}: {reason}")]
    SubscriptionFailed {
        partition: PartitionKey,
        reason: String,
    },

    #[error("Invalid page: {0} (pages start at 1)")]
    InvalidPage(u64),

    #[error("No active partition")]
    NoActivePartition,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Event source error: {0}")]
    Source(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Deserialization(e.to_string())
    }
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
