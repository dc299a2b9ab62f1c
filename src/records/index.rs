//! Per-partition ordering index over the event log.

use crate::types::{EventId, PartitionKey, ThreatEvent, Timestamp};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Index entry: ordering key plus log offset.
#[derive(Clone, Debug)]
struct IndexEntry {
    timestamp: Timestamp,
    id: EventId,
    offset: usize,
}

impl IndexEntry {
    /// Newest first, id breaks ties. Mirrors `ThreatEvent::feed_order`.
    fn feed_order(&self, timestamp: Timestamp, id: &EventId) -> Ordering {
        timestamp
            .cmp(&self.timestamp)
            .then_with(|| id.cmp(&self.id))
    }
}

/// Keeps each partition's offsets sorted in feed order so a page is a slice.
pub struct PartitionIndex {
    partitions: RwLock<HashMap<PartitionKey, Vec<IndexEntry>>>,
}

impl PartitionIndex {
    pub fn new() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
        }
    }

    /// Index an event written at `offset`.
    ///
    /// Out-of-order timestamps (backfill) are placed by binary search.
    pub fn add(&self, event: &ThreatEvent, offset: usize) {
        let mut partitions = self.partitions.write();
        let entries = partitions.entry(event.partition.clone()).or_default();

        let pos = entries.partition_point(|entry| {
            entry.feed_order(event.timestamp, &event.id) == Ordering::Less
        });
        entries.insert(
            pos,
            IndexEntry {
                timestamp: event.timestamp,
                id: event.id.clone(),
                offset,
            },
        );
    }

    /// Offsets for one page of a partition, plus the partition's total count.
    pub fn page(&self, partition: &PartitionKey, offset: usize, limit: usize) -> (Vec<usize>, u64) {
        let partitions = self.partitions.read();
        match partitions.get(partition) {
            Some(entries) => {
                let offsets = entries
                    .iter()
                    .skip(offset)
                    .take(limit)
                    .map(|entry| entry.offset)
                    .collect();
                (offsets, entries.len() as u64)
            }
            None => (Vec::new(), 0),
        }
    }

    /// Number of events in a partition.
    pub fn count(&self, partition: &PartitionKey) -> u64 {
        self.partitions
            .read()
            .get(partition)
            .map(|entries| entries.len() as u64)
            .unwrap_or(0)
    }

    /// Partitions with at least one event.
    pub fn partitions(&self) -> Vec<PartitionKey> {
        self.partitions.read().keys().cloned().collect()
    }
}

impl Default for PartitionIndex {
    fn default() -> Self {
        Self::new()
    }
}
