//! Subscription types for insert push delivery.

use crate::error::{FeedError, Result};
use crate::types::{PartitionKey, ThreatEvent};
use serde::{Deserialize, Serialize};

/// Default max buffered messages per subscription.
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Partition whose inserts are delivered.
    pub partition: PartitionKey,

    /// Max buffered messages before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,
}

impl SubscriptionConfig {
    pub fn for_partition(partition: PartitionKey) -> Self {
        Self {
            partition,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(FeedError::InvalidConfig(format!(
                "subscription buffer for {} must be > 0",
                self.partition
            )));
        }
        Ok(())
    }
}

/// Messages delivered on a subscription channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    /// An event was inserted (or redelivered) for the subscribed partition.
    Insert { event: ThreatEvent },

    /// Subscription was dropped. No further messages follow.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Transport went away.
    Disconnected,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to a live subscription.
///
/// Dropping the handle disconnects the receiver; the source notices on its
/// next send and forgets the subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub partition: PartitionKey,
    /// Channel to receive messages.
    pub receiver: crossbeam_channel::Receiver<FeedMessage>,
}

impl SubscriptionHandle {
    /// Receive the next message (blocking).
    pub fn recv(&self) -> std::result::Result<FeedMessage, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<FeedMessage, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> std::result::Result<FeedMessage, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("partition", &self.partition)
            .finish()
    }
}
