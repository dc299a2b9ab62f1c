//! In-process event source tying the log, index and subscriptions together.

use crate::config::FeedConfig;
use crate::error::Result;
use crate::records::{EventLog, PartitionIndex};
use crate::source::EventSource;
use crate::subscriptions::{
    DropReason, SubscriptionConfig, SubscriptionHandle, SubscriptionId, SubscriptionManager,
    DEFAULT_BUFFER_SIZE,
};
use crate::types::{EventId, EventInput, PageQuery, PageResult, PartitionKey, ThreatEvent, Timestamp};
use parking_lot::Mutex;

/// Thread-safe in-memory implementation of [`EventSource`].
///
/// Provides:
/// - Appending and backfilling events
/// - Newest-first paging per partition
/// - Partition-filtered push subscriptions
/// - Redelivery of existing events (at-least-once transports)
pub struct MemoryEventSource {
    log: EventLog,
    index: PartitionIndex,
    subscriptions: SubscriptionManager,

    /// Channel size for new subscriptions.
    subscription_buffer: usize,

    /// Serializes writes so log, index and broadcast stay in step.
    write_lock: Mutex<()>,
}

impl MemoryEventSource {
    pub fn new() -> Self {
        Self::with_subscription_buffer(DEFAULT_BUFFER_SIZE)
    }

    /// Source whose subscriptions use `config.subscription_buffer`.
    pub fn from_config(config: &FeedConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_subscription_buffer(config.subscription_buffer))
    }

    pub fn with_subscription_buffer(subscription_buffer: usize) -> Self {
        Self {
            log: EventLog::new(),
            index: PartitionIndex::new(),
            subscriptions: SubscriptionManager::new(),
            subscription_buffer,
            write_lock: Mutex::new(()),
        }
    }

    // --- Writes ---

    /// Append an event stamped with the current time.
    pub fn append(&self, input: EventInput) -> ThreatEvent {
        self.append_at(input, Timestamp::now())
    }

    /// Append an event with an explicit event time.
    pub fn append_at(&self, input: EventInput, timestamp: Timestamp) -> ThreatEvent {
        let _lock = self.write_lock.lock();

        let (event, offset) = self.log.append(input, timestamp);
        self.index.add(&event, offset);
        self.subscriptions.broadcast_insert(&event);

        event
    }

    /// Backfill an event with its own id and timestamp.
    ///
    /// Returns false (and broadcasts nothing) if the id already exists.
    pub fn insert(&self, event: ThreatEvent) -> bool {
        let _lock = self.write_lock.lock();

        match self.log.insert(event.clone()) {
            Some(offset) => {
                self.index.add(&event, offset);
                self.subscriptions.broadcast_insert(&event);
                true
            }
            None => false,
        }
    }

    /// Broadcast an existing event again, as an at-least-once transport would.
    ///
    /// Returns false if the id is unknown.
    pub fn redeliver(&self, id: &EventId) -> bool {
        match self.log.get(id) {
            Some(event) => {
                self.subscriptions.broadcast_insert(&event);
                true
            }
            None => false,
        }
    }

    /// Drop every live subscription, e.g. to simulate a transport outage.
    pub fn disconnect_all(&self) {
        self.subscriptions.disconnect_all(DropReason::Disconnected);
    }

    // --- Reads ---

    /// Look up an event by id.
    pub fn get(&self, id: &EventId) -> Option<ThreatEvent> {
        self.log.get(id)
    }

    /// Number of events in a partition.
    pub fn event_count(&self, partition: &PartitionKey) -> u64 {
        self.index.count(partition)
    }

    /// Total events across all partitions.
    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Partitions with at least one event.
    pub fn partitions(&self) -> Vec<PartitionKey> {
        self.index.partitions()
    }

    /// Live subscription count (leak checks).
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.subscription_count()
    }
}

impl Default for MemoryEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for MemoryEventSource {
    fn query_page(&self, query: &PageQuery) -> Result<PageResult> {
        let (offsets, total_count) = self.index.page(&query.partition, query.offset, query.limit);
        Ok(PageResult {
            rows: self.log.read_many(&offsets),
            total_count,
        })
    }

    fn subscribe_inserts(&self, partition: &PartitionKey) -> Result<SubscriptionHandle> {
        let config =
            SubscriptionConfig::for_partition(partition.clone()).with_buffer_size(self.subscription_buffer);
        self.subscriptions.subscribe(config)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.unsubscribe(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::FeedMessage;
    use crate::types::Verdict;
    use std::time::Duration;

    fn input(partition: &str) -> EventInput {
        EventInput::new(partition, Verdict::threat(0.9, "path traversal"))
            .with_request("GET", "/../../etc/passwd", "10.1.1.1")
    }

    #[test]
    fn test_query_page_newest_first() {
        let source = MemoryEventSource::new();
        for i in 0..5 {
            source.append_at(input("p1"), Timestamp(i));
        }
        source.append_at(input("p2"), Timestamp(100));

        let page = source
            .query_page(&PageQuery {
                partition: PartitionKey::new("p1"),
                offset: 1,
                limit: 2,
            })
            .unwrap();

        assert_eq!(page.total_count, 5);
        let stamps: Vec<_> = page.rows.iter().map(|e| e.timestamp.0).collect();
        assert_eq!(stamps, vec![3, 2]);
        assert!(page.rows.iter().all(|e| e.partition == PartitionKey::new("p1")));
    }

    #[test]
    fn test_append_is_pushed_to_partition_subscribers() {
        let source = MemoryEventSource::new();
        let handle = source.subscribe_inserts(&PartitionKey::new("p1")).unwrap();

        let event = source.append(input("p1"));
        source.append(input("p2"));

        match handle.recv_timeout(Duration::from_millis(100)).unwrap() {
            FeedMessage::Insert { event: pushed } => assert_eq!(pushed.id, event.id),
            other => panic!("Expected Insert, got {:?}", other),
        }
        assert!(handle.try_recv().is_err());
    }

    #[test]
    fn test_redeliver_pushes_same_id() {
        let source = MemoryEventSource::new();
        let event = source.append(input("p1"));
        let handle = source.subscribe_inserts(&PartitionKey::new("p1")).unwrap();

        assert!(source.redeliver(&event.id));
        assert!(!source.redeliver(&EventId::new("missing")));

        match handle.try_recv().unwrap() {
            FeedMessage::Insert { event: pushed } => assert_eq!(pushed, event),
            other => panic!("Expected Insert, got {:?}", other),
        }
    }

    #[test]
    fn test_insert_duplicate_is_ignored() {
        let source = MemoryEventSource::new();
        let event = source.append(input("p1"));

        assert!(!source.insert(event));
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_configured_buffer_drops_slow_subscriber() {
        let config = FeedConfig::from_json(r#"{"subscription_buffer": 2}"#).unwrap();
        let source = MemoryEventSource::from_config(&config).unwrap();
        let handle = source.subscribe_inserts(&PartitionKey::new("p1")).unwrap();

        for _ in 0..10 {
            source.append(input("p1"));
        }

        assert_eq!(source.subscription_count(), 0);
        let delivered: Vec<_> = handle.receiver.try_iter().collect();
        assert_eq!(delivered.len(), 2);
        assert!(delivered
            .iter()
            .all(|m| matches!(m, FeedMessage::Insert { .. })));
    }

    #[test]
    fn test_zero_subscription_buffer_rejected() {
        let source = MemoryEventSource::with_subscription_buffer(0);
        let result = source.subscribe_inserts(&PartitionKey::new("p1"));

        assert!(matches!(result, Err(crate::FeedError::InvalidConfig(_))));
    }

    #[test]
    fn test_unsubscribe_removes_subscription() {
        let source = MemoryEventSource::new();
        let handle = source.subscribe_inserts(&PartitionKey::new("p1")).unwrap();
        assert_eq!(source.subscription_count(), 1);

        source.unsubscribe(handle.id);
        assert_eq!(source.subscription_count(), 0);
    }
}
