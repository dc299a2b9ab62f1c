//! Subscription lifecycle shared by the feed components.
//!
//! Each component owns one [`SubscriptionSlot`]. The slot holds at most one
//! subscription handle, for one partition, and nulls it on release so that
//! nothing can be drained from a torn-down subscription.

use crate::error::{FeedError, Result};
use crate::source::EventSource;
use crate::subscriptions::{DropReason, FeedMessage, SubscriptionHandle};
use crate::types::{PartitionKey, ThreatEvent};
use crossbeam_channel::TryRecvError;

/// One message taken off a bound subscription.
#[derive(Clone, Debug)]
pub enum Delivery {
    Insert(ThreatEvent),
    /// The transport closed the subscription. The slot is already empty.
    Closed(DropReason),
}

/// What a component did with one pushed event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Same id already held (redelivery).
    Duplicate,
    /// Event belongs to a partition other than the active one.
    PartitionMismatch,
    /// No partition is active; the event arrived after teardown.
    Inactive,
    /// Older than everything in a full buffer.
    BelowWindow,
}

/// How a fetch result was applied.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    Applied,
    /// The result belongs to a superseded request or partition.
    StaleResponseDiscarded,
    /// The fetch failed; last-good state was kept.
    Failed(FeedError),
}

impl FetchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, FetchOutcome::Applied)
    }

    /// `Failed` becomes `Err`; the other outcomes are not errors.
    pub fn into_result(self) -> Result<()> {
        match self {
            FetchOutcome::Failed(e) => Err(e),
            FetchOutcome::Applied | FetchOutcome::StaleResponseDiscarded => Ok(()),
        }
    }
}

/// Tally of one `pump` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub admitted: usize,
    pub ignored: usize,
    /// Set when the transport closed the subscription during this pump.
    pub closed: Option<DropReason>,
}

impl PumpReport {
    pub(crate) fn record(&mut self, admission: Admission) {
        match admission {
            Admission::Admitted => self.admitted += 1,
            _ => self.ignored += 1,
        }
    }
}

/// Exclusive owner of a component's push subscription.
pub struct SubscriptionSlot {
    /// Consumer label for logs.
    consumer: &'static str,
    active: Option<SubscriptionHandle>,
}

impl SubscriptionSlot {
    pub fn new(consumer: &'static str) -> Self {
        Self {
            consumer,
            active: None,
        }
    }

    /// Subscribe to `partition`, releasing any current subscription first.
    ///
    /// On failure the slot is left empty.
    pub fn bind<S: EventSource + ?Sized>(
        &mut self,
        source: &S,
        partition: &PartitionKey,
    ) -> Result<()> {
        self.release(source);

        match source.subscribe_inserts(partition) {
            Ok(handle) => {
                tracing::debug!(
                    consumer = self.consumer,
                    %partition,
                    subscription = handle.id.0,
                    "bound push subscription"
                );
                self.active = Some(handle);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(consumer = self.consumer, %partition, error = %e, "push subscription failed");
                Err(match e {
                    FeedError::SubscriptionFailed { .. } => e,
                    other => FeedError::SubscriptionFailed {
                        partition: partition.clone(),
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    /// Unsubscribe and drop the handle. Returns false if nothing was bound.
    pub fn release<S: EventSource + ?Sized>(&mut self, source: &S) -> bool {
        match self.active.take() {
            Some(handle) => {
                source.unsubscribe(handle.id);
                tracing::debug!(
                    consumer = self.consumer,
                    partition = %handle.partition,
                    subscription = handle.id.0,
                    "released push subscription"
                );
                true
            }
            None => false,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.active.is_some()
    }

    /// Partition of the bound subscription.
    pub fn partition(&self) -> Option<&PartitionKey> {
        self.active.as_ref().map(|handle| &handle.partition)
    }

    /// Take every pending message without blocking.
    ///
    /// A closed transport ends the drain and empties the slot.
    pub fn drain(&mut self) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        let Some(handle) = self.active.as_ref() else {
            return deliveries;
        };

        let closed = loop {
            match handle.try_recv() {
                Ok(FeedMessage::Insert { event }) => deliveries.push(Delivery::Insert(event)),
                Ok(FeedMessage::Dropped { reason }) => break Some(reason),
                Err(TryRecvError::Empty) => break None,
                Err(TryRecvError::Disconnected) => break Some(DropReason::Disconnected),
            }
        };

        if let Some(reason) = closed {
            tracing::warn!(
                consumer = self.consumer,
                partition = %handle.partition,
                ?reason,
                "push subscription closed by transport"
            );
            self.active = None;
            deliveries.push(Delivery::Closed(reason));
        }

        deliveries
    }
}

impl std::fmt::Debug for SubscriptionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionSlot")
            .field("consumer", &self.consumer)
            .field("active", &self.active)
            .finish()
    }
}
