//! Bounded live buffer of the newest events for the active partition.
//!
//! The reconciler merges an initial snapshot query with push arrivals. The
//! buffer is unique by id, newest first by `(timestamp, id)`, and never holds
//! more than `live_capacity` events. Pushes are sort-inserted because the
//! transport guarantees neither order nor single delivery.

use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use crate::lifecycle::{Admission, Delivery, FetchOutcome, PumpReport, SubscriptionSlot};
use crate::source::EventSource;
use crate::stats::FeedStats;
use crate::subscriptions::DropReason;
use crate::types::{EventId, PageQuery, PageResult, PartitionKey, ThreatEvent};
use std::cmp::Ordering;
use std::collections::HashSet;

const CONSUMER: &str = "live_feed";

/// A pending snapshot fetch for one activation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotTicket {
    partition: PartitionKey,
    generation: u64,
    limit: usize,
}

impl SnapshotTicket {
    pub fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    /// The query to run against the source.
    pub fn query(&self) -> PageQuery {
        PageQuery {
            partition: self.partition.clone(),
            offset: 0,
            limit: self.limit,
        }
    }
}

/// Live "recent activity" feed.
pub struct LiveFeedReconciler<S: EventSource> {
    source: S,
    capacity: usize,
    slot: SubscriptionSlot,

    /// Active partition; `None` after deactivation.
    partition: Option<PartitionKey>,

    /// Bumped on every activation change. Tickets from older generations are stale.
    generation: u64,

    /// Newest first.
    events: Vec<ThreatEvent>,
    ids: HashSet<EventId>,

    loading: bool,
    last_error: Option<FeedError>,
}

impl<S: EventSource> LiveFeedReconciler<S> {
    pub fn new(source: S, config: &FeedConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            capacity: config.live_capacity,
            slot: SubscriptionSlot::new(CONSUMER),
            partition: None,
            generation: 0,
            events: Vec::with_capacity(config.live_capacity),
            ids: HashSet::with_capacity(config.live_capacity),
            loading: false,
            last_error: None,
        })
    }

    // --- Activation ---

    /// Switch to `partition`, load its snapshot and subscribe to its inserts.
    ///
    /// Activating the already-active partition does nothing. `None` clears
    /// the buffer and leaves no subscription. A failed snapshot is returned
    /// as `SnapshotFetchFailed` but the subscription is still opened.
    pub fn activate(&mut self, partition: Option<PartitionKey>) -> Result<()> {
        let Some(ticket) = self.begin_activate(partition) else {
            return Ok(());
        };

        let result = self.source.query_page(&ticket.query());
        self.resolve_snapshot(ticket, result).into_result()?;

        match (&self.last_error, self.slot.is_bound()) {
            (Some(e), false) => Err(e.clone()),
            _ => Ok(()),
        }
    }

    /// First half of [`activate`](Self::activate) for hosts that fetch
    /// asynchronously. Returns the snapshot to fetch, or `None` when there is
    /// nothing to load.
    pub fn begin_activate(&mut self, partition: Option<PartitionKey>) -> Option<SnapshotTicket> {
        if partition.is_some() && partition == self.partition {
            return None;
        }

        self.deactivate();
        self.events.clear();
        self.ids.clear();
        self.last_error = None;

        let partition = partition?;
        tracing::debug!(consumer = CONSUMER, %partition, "activating");

        self.partition = Some(partition.clone());
        self.loading = true;
        Some(SnapshotTicket {
            partition,
            generation: self.generation,
            limit: self.capacity,
        })
    }

    /// Apply a snapshot result, then make sure the push subscription is open.
    pub fn resolve_snapshot(
        &mut self,
        ticket: SnapshotTicket,
        result: Result<PageResult>,
    ) -> FetchOutcome {
        if !self.is_current(&ticket) {
            tracing::trace!(
                consumer = CONSUMER,
                partition = %ticket.partition,
                "discarding stale snapshot"
            );
            return FetchOutcome::StaleResponseDiscarded;
        }

        self.loading = false;
        let outcome = match result {
            Ok(page) => {
                for event in page.rows {
                    if self.admit(event) == Admission::PartitionMismatch {
                        tracing::warn!(
                            consumer = CONSUMER,
                            partition = %ticket.partition,
                            "snapshot row from another partition dropped"
                        );
                    }
                }
                FetchOutcome::Applied
            }
            Err(e) => {
                let error = FeedError::SnapshotFetchFailed {
                    partition: ticket.partition.clone(),
                    reason: e.to_string(),
                };
                tracing::warn!(consumer = CONSUMER, error = %error, "snapshot fetch failed");
                self.last_error = Some(error.clone());
                FetchOutcome::Failed(error)
            }
        };

        if !self.slot.is_bound() {
            if let Err(e) = self.slot.bind(&self.source, &ticket.partition) {
                // A failed snapshot stays the reported error; retry_snapshot rebinds too.
                if outcome.is_applied() {
                    self.last_error = Some(e);
                }
            }
        }

        outcome
    }

    /// Re-run the snapshot for the active partition and merge it in.
    ///
    /// Also retries the subscription if it is not open.
    pub fn retry_snapshot(&mut self) -> Result<()> {
        let partition = self.partition.clone().ok_or(FeedError::NoActivePartition)?;
        let ticket = SnapshotTicket {
            partition,
            generation: self.generation,
            limit: self.capacity,
        };

        self.loading = true;
        self.last_error = None;
        let result = self.source.query_page(&ticket.query());
        self.resolve_snapshot(ticket, result).into_result()
    }

    /// Close the push subscription. Idempotent.
    ///
    /// The buffer keeps its contents until the next activation, but no event
    /// is admitted until then.
    pub fn deactivate(&mut self) {
        self.slot.release(&self.source);
        if let Some(partition) = self.partition.take() {
            tracing::debug!(consumer = CONSUMER, %partition, "deactivated");
        }
        self.generation += 1;
        self.loading = false;
    }

    fn is_current(&self, ticket: &SnapshotTicket) -> bool {
        ticket.generation == self.generation && self.partition.as_ref() == Some(&ticket.partition)
    }

    // --- Push delivery ---

    /// Merge one pushed event.
    ///
    /// Nothing is admitted while no subscription is bound, including after
    /// the transport closed it.
    pub fn on_push(&mut self, event: ThreatEvent) -> Admission {
        if !self.slot.is_bound() {
            tracing::trace!(consumer = CONSUMER, "push without a bound subscription");
            return Admission::Inactive;
        }
        self.merge_push(event)
    }

    /// Admission for events drained from the bound subscription.
    fn merge_push(&mut self, event: ThreatEvent) -> Admission {
        let admission = self.admit(event);
        if admission != Admission::Admitted {
            tracing::trace!(consumer = CONSUMER, ?admission, "push not admitted");
        }
        admission
    }

    /// Drain the subscription and merge everything it delivered.
    pub fn pump(&mut self) -> PumpReport {
        let mut report = PumpReport::default();
        for delivery in self.slot.drain() {
            match delivery {
                Delivery::Insert(event) => report.record(self.merge_push(event)),
                Delivery::Closed(reason) => {
                    self.on_transport_closed(&reason);
                    report.closed = Some(reason);
                }
            }
        }
        report
    }

    fn on_transport_closed(&mut self, reason: &DropReason) {
        if let Some(partition) = &self.partition {
            self.last_error = Some(FeedError::SubscriptionFailed {
                partition: partition.clone(),
                reason: format!("{:?}", reason),
            });
        }
    }

    fn admit(&mut self, event: ThreatEvent) -> Admission {
        let Some(active) = &self.partition else {
            return Admission::Inactive;
        };
        if event.partition != *active {
            return Admission::PartitionMismatch;
        }
        if self.ids.contains(&event.id) {
            return Admission::Duplicate;
        }

        let pos = self
            .events
            .partition_point(|held| held.feed_order(&event) == Ordering::Less);
        if pos >= self.capacity {
            return Admission::BelowWindow;
        }

        self.ids.insert(event.id.clone());
        self.events.insert(pos, event);
        if self.events.len() > self.capacity {
            if let Some(evicted) = self.events.pop() {
                self.ids.remove(&evicted.id);
            }
        }
        Admission::Admitted
    }

    // --- State surface ---

    /// Buffered events, newest first.
    pub fn events(&self) -> &[ThreatEvent] {
        &self.events
    }

    pub fn is_subscribed(&self) -> bool {
        self.slot.is_bound()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn partition(&self) -> Option<&PartitionKey> {
        self.partition.as_ref()
    }

    pub fn last_error(&self) -> Option<&FeedError> {
        self.last_error.as_ref()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Verdict totals over the buffer.
    pub fn stats(&self) -> FeedStats {
        FeedStats::from_events(&self.events)
    }
}

impl<S: EventSource> Drop for LiveFeedReconciler<S> {
    fn drop(&mut self) {
        self.slot.release(&self.source);
    }
}
