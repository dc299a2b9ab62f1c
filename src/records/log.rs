//! Append-only in-memory event log.

use crate::types::{EventId, EventInput, ThreatEvent, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Append-only event log.
///
/// Events are addressed by their offset in the log. Offsets never change.
pub struct EventLog {
    /// Events in arrival order.
    entries: RwLock<Vec<ThreatEvent>>,

    /// Offset of each event by id.
    offsets: RwLock<HashMap<EventId, usize>>,

    /// Next generated id.
    next_id: RwLock<u64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            offsets: RwLock::new(HashMap::new()),
            next_id: RwLock::new(1),
        }
    }

    /// Append an event with a generated id.
    ///
    /// Returns the event and the offset where it was written.
    pub fn append(&self, input: EventInput, timestamp: Timestamp) -> (ThreatEvent, usize) {
        let mut entries = self.entries.write();
        let mut offsets = self.offsets.write();

        let id = {
            let mut next = self.next_id.write();
            loop {
                let candidate = EventId(format!("evt-{:08}", *next));
                *next += 1;
                if !offsets.contains_key(&candidate) {
                    break candidate;
                }
            }
        };

        let event = input.into_event(id.clone(), timestamp);
        let offset = entries.len();
        entries.push(event.clone());
        offsets.insert(id, offset);

        (event, offset)
    }

    /// Write an event with a caller-chosen id and timestamp (backfill).
    ///
    /// Returns `None` if the id is already in the log.
    pub fn insert(&self, event: ThreatEvent) -> Option<usize> {
        let mut entries = self.entries.write();
        let mut offsets = self.offsets.write();

        if offsets.contains_key(&event.id) {
            return None;
        }

        let offset = entries.len();
        offsets.insert(event.id.clone(), offset);
        entries.push(event);
        Some(offset)
    }

    /// Read the event at an offset.
    pub fn read_at(&self, offset: usize) -> Option<ThreatEvent> {
        self.entries.read().get(offset).cloned()
    }

    /// Read several offsets in order, skipping any that are out of range.
    pub fn read_many(&self, offsets: &[usize]) -> Vec<ThreatEvent> {
        let entries = self.entries.read();
        offsets
            .iter()
            .filter_map(|&offset| entries.get(offset).cloned())
            .collect()
    }

    /// Look up an event by id.
    pub fn get(&self, id: &EventId) -> Option<ThreatEvent> {
        let offset = *self.offsets.read().get(id)?;
        self.read_at(offset)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Verdict;

    #[test]
    fn test_append_assigns_unique_ids() {
        let log = EventLog::new();
        let (a, off_a) = log.append(EventInput::new("p1", Verdict::allow(0.5)), Timestamp(1));
        let (b, off_b) = log.append(EventInput::new("p1", Verdict::allow(0.5)), Timestamp(2));

        assert_ne!(a.id, b.id);
        assert_eq!(off_a, 0);
        assert_eq!(off_b, 1);
        assert_eq!(log.get(&b.id).unwrap().timestamp, Timestamp(2));
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let log = EventLog::new();
        let event = EventInput::new("p1", Verdict::allow(0.5))
            .into_event(EventId::new("fixed"), Timestamp(10));

        assert_eq!(log.insert(event.clone()), Some(0));
        assert_eq!(log.insert(event), None);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_append_skips_backfilled_id() {
        let log = EventLog::new();
        let backfill = EventInput::new("p1", Verdict::allow(0.5))
            .into_event(EventId::new("evt-00000001"), Timestamp(10));
        log.insert(backfill);

        let (event, _) = log.append(EventInput::new("p1", Verdict::allow(0.5)), Timestamp(11));
        assert_eq!(event.id, EventId::new("evt-00000002"));
    }
}
