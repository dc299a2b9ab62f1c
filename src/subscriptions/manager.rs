//! Subscription manager for broadcasting inserts to partition subscribers.

use crate::error::Result;
use crate::types::ThreatEvent;
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{
    DropReason, FeedMessage, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<FeedMessage>,
}

impl Subscription {
    /// Try to send a message. Returns false if the buffer is full or the
    /// receiver is gone (subscriber will be dropped).
    fn try_send(&self, message: FeedMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }

    fn matches(&self, event: &ThreatEvent) -> bool {
        self.config.partition == event.partition
    }
}

/// Manages subscriptions and broadcasts inserts.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription. Only inserts broadcast after this call are
    /// delivered.
    pub fn subscribe(&self, config: SubscriptionConfig) -> Result<SubscriptionHandle> {
        config.validate()?;
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size);
        let partition = config.partition.clone();

        self.subscriptions
            .write()
            .insert(id, Subscription { config, sender });

        tracing::debug!(subscription = id.0, %partition, "subscription opened");
        Ok(SubscriptionHandle {
            id,
            partition,
            receiver,
        })
    }

    /// Unsubscribe and clean up. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // Best effort; the receiver is usually dropped right after.
            let _ = sub.sender.try_send(FeedMessage::Dropped {
                reason: DropReason::Unsubscribed,
            });
            tracing::debug!(subscription = id.0, partition = %sub.config.partition, "subscription closed");
        }
    }

    /// Drop every subscription, notifying each with `reason`.
    pub fn disconnect_all(&self, reason: DropReason) {
        let mut subs = self.subscriptions.write();
        for (_, sub) in subs.drain() {
            let _ = sub.sender.try_send(FeedMessage::Dropped {
                reason: reason.clone(),
            });
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Broadcast an insert to subscribers of the event's partition.
    pub fn broadcast_insert(&self, event: &ThreatEvent) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if sub.matches(event)
                    && !sub.try_send(FeedMessage::Insert {
                        event: event.clone(),
                    })
                {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    tracing::warn!(
                        subscription = id.0,
                        partition = %sub.config.partition,
                        "dropping slow or disconnected subscriber"
                    );
                    // Might fail if the buffer is still full.
                    let _ = sub.sender.try_send(FeedMessage::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use crate::types::{EventId, EventInput, PartitionKey, Timestamp, Verdict};
    use std::time::Duration;

    fn make_event(partition: &str, id: u64) -> ThreatEvent {
        EventInput::new(partition, Verdict::threat(0.8, "xss"))
            .into_event(EventId(format!("e{}", id)), Timestamp(id as i64))
    }

    fn config(partition: &str) -> SubscriptionConfig {
        SubscriptionConfig::for_partition(PartitionKey::new(partition))
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let manager = SubscriptionManager::new();

        let handle = manager.subscribe(config("p1")).unwrap();
        assert_eq!(manager.subscription_count(), 1);

        manager.unsubscribe(handle.id);
        assert_eq!(manager.subscription_count(), 0);

        let last = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert!(matches!(
            last,
            FeedMessage::Dropped {
                reason: DropReason::Unsubscribed
            }
        ));
    }

    #[test]
    fn test_broadcast_to_matching_partition() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(config("p1")).unwrap();

        manager.broadcast_insert(&make_event("p1", 1));

        match handle.recv_timeout(Duration::from_millis(100)).unwrap() {
            FeedMessage::Insert { event } => assert_eq!(event.id, EventId::new("e1")),
            other => panic!("Expected Insert, got {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_filters_other_partitions() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(config("p1")).unwrap();

        manager.broadcast_insert(&make_event("p2", 1));

        assert!(handle.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let manager = SubscriptionManager::new();
        let _handle = manager.subscribe(config("p1").with_buffer_size(2)).unwrap();

        for i in 0..10 {
            manager.broadcast_insert(&make_event("p1", i));
        }

        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let manager = SubscriptionManager::new();
        let result = manager.subscribe(config("p1").with_buffer_size(0));

        assert!(matches!(result, Err(FeedError::InvalidConfig(_))));
        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_dropped_receiver_is_forgotten() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(config("p1")).unwrap();
        drop(handle);

        manager.broadcast_insert(&make_event("p1", 1));
        assert_eq!(manager.subscription_count(), 0);
    }
}
