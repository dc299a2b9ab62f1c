//! The event source boundary consumed by the feed components.

use crate::error::Result;
use crate::subscriptions::{SubscriptionHandle, SubscriptionId};
use crate::types::{PageQuery, PageResult, PartitionKey};
use std::sync::Arc;

/// A pageable, subscribable view of the append-only threat log.
///
/// `query_page` is a point-in-time read, newest first by
/// `(timestamp, id)`, and never returns rows from another partition.
/// `subscribe_inserts` delivers new events at least once: redelivery and
/// out-of-order arrival are possible and are handled by the consumers.
pub trait EventSource: Send + Sync {
    /// Fetch one page of a partition together with its total row count.
    fn query_page(&self, query: &PageQuery) -> Result<PageResult>;

    /// Open a push subscription for inserts into `partition`.
    fn subscribe_inserts(&self, partition: &PartitionKey) -> Result<SubscriptionHandle>;

    /// Close a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

impl<S: EventSource + ?Sized> EventSource for Arc<S> {
    fn query_page(&self, query: &PageQuery) -> Result<PageResult> {
        (**self).query_page(query)
    }

    fn subscribe_inserts(&self, partition: &PartitionKey) -> Result<SubscriptionHandle> {
        (**self).subscribe_inserts(partition)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        (**self).unsubscribe(id)
    }
}
