//! Error handling and degraded-mode tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use threat_feed::{
    EventInput, EventSource, FeedConfig, FeedError, LiveFeedReconciler, MemoryEventSource,
    PageQuery, PageResult, PagedLogViewer, PartitionKey, Result, SubscriptionHandle,
    SubscriptionId, Timestamp, Verdict, ViewState,
};

/// Wraps the in-memory source with switchable failures.
#[derive(Default)]
struct FlakySource {
    inner: MemoryEventSource,
    failing_queries: AtomicUsize,
    fail_subscribe: AtomicBool,
}

impl FlakySource {
    fn fail_next_queries(&self, n: usize) {
        self.failing_queries.store(n, Ordering::SeqCst);
    }

    fn fail_subscriptions(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }
}

impl EventSource for FlakySource {
    fn query_page(&self, query: &PageQuery) -> Result<PageResult> {
        let remaining = self.failing_queries.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_queries.store(remaining - 1, Ordering::SeqCst);
            return Err(FeedError::Source("connection reset".into()));
        }
        self.inner.query_page(query)
    }

    fn subscribe_inserts(&self, partition: &PartitionKey) -> Result<SubscriptionHandle> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(FeedError::Source("realtime channel refused".into()));
        }
        self.inner.subscribe_inserts(partition)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.unsubscribe(id)
    }
}

fn key(s: &str) -> PartitionKey {
    PartitionKey::new(s)
}

fn seed(source: &FlakySource, partition: &str, count: i64) {
    for i in 0..count {
        source
            .inner
            .append_at(EventInput::new(partition, Verdict::allow(0.7)), Timestamp(i));
    }
}

// --- Live feed ---

#[test]
fn test_snapshot_failure_keeps_live_updates() {
    let source = Arc::new(FlakySource::default());
    seed(&source, "p", 5);
    source.fail_next_queries(1);

    let mut feed = LiveFeedReconciler::new(Arc::clone(&source), &FeedConfig::default()).unwrap();
    let result = feed.activate(Some(key("p")));

    assert!(matches!(result, Err(FeedError::SnapshotFetchFailed { .. })));
    assert!(feed.events().is_empty());
    assert!(!feed.is_loading());
    assert!(feed.is_subscribed());
    assert!(matches!(
        feed.last_error(),
        Some(FeedError::SnapshotFetchFailed { .. })
    ));

    // Degraded to "ongoing only"
    source
        .inner
        .append_at(EventInput::new("p", Verdict::threat(0.9, "xss")), Timestamp(100));
    assert_eq!(feed.pump().admitted, 1);
    assert_eq!(feed.events().len(), 1);
}

#[test]
fn test_snapshot_retry_merges_with_pushes() {
    let source = Arc::new(FlakySource::default());
    seed(&source, "p", 3);
    source.fail_next_queries(1);

    let mut feed = LiveFeedReconciler::new(Arc::clone(&source), &FeedConfig::default()).unwrap();
    let _ = feed.activate(Some(key("p")));

    let pushed = source
        .inner
        .append_at(EventInput::new("p", Verdict::allow(0.5)), Timestamp(50));
    feed.pump();

    feed.retry_snapshot().unwrap();

    assert!(feed.last_error().is_none());
    // Snapshot includes the pushed event too; it must not be duplicated
    assert_eq!(feed.events().len(), 4);
    assert_eq!(feed.events()[0].id, pushed.id);
}

#[test]
fn test_retry_without_partition() {
    let source = Arc::new(FlakySource::default());
    let mut feed = LiveFeedReconciler::new(Arc::clone(&source), &FeedConfig::default()).unwrap();

    assert_eq!(feed.retry_snapshot(), Err(FeedError::NoActivePartition));
}

#[test]
fn test_live_feed_subscription_failure_degrades() {
    let source = Arc::new(FlakySource::default());
    seed(&source, "p", 3);
    source.fail_subscriptions(true);

    let mut feed = LiveFeedReconciler::new(Arc::clone(&source), &FeedConfig::default()).unwrap();
    let result = feed.activate(Some(key("p")));

    assert!(matches!(result, Err(FeedError::SubscriptionFailed { .. })));
    assert_eq!(feed.events().len(), 3);
    assert!(!feed.is_subscribed());

    // Retrying the snapshot also retries the subscription
    source.fail_subscriptions(false);
    feed.retry_snapshot().unwrap();
    assert!(feed.is_subscribed());
    assert_eq!(feed.events().len(), 3);
}

#[test]
fn test_snapshot_failure_reported_over_subscription_failure() {
    let source = Arc::new(FlakySource::default());
    seed(&source, "p", 4);
    source.fail_next_queries(1);
    source.fail_subscriptions(true);

    let mut feed = LiveFeedReconciler::new(Arc::clone(&source), &FeedConfig::default()).unwrap();
    let result = feed.activate(Some(key("p")));

    assert!(matches!(result, Err(FeedError::SnapshotFetchFailed { .. })));
    assert!(matches!(
        feed.last_error(),
        Some(FeedError::SnapshotFetchFailed { .. })
    ));
    assert!(!feed.is_subscribed());

    // One retry recovers both the snapshot and the subscription
    source.fail_subscriptions(false);
    feed.retry_snapshot().unwrap();
    assert!(feed.last_error().is_none());
    assert!(feed.is_subscribed());
    assert_eq!(feed.events().len(), 4);
}

// --- Paged log ---

#[test]
fn test_page_failure_keeps_rows_visible() {
    let source = Arc::new(FlakySource::default());
    seed(&source, "p", 25);

    let config = FeedConfig::default().with_page_size(10);
    let mut table = PagedLogViewer::new(Arc::clone(&source), &config).unwrap();
    table.activate(Some(key("p"))).unwrap();
    let before = table.rows().to_vec();

    source.fail_next_queries(1);
    let result = table.set_page(2);

    assert!(matches!(
        result,
        Err(FeedError::PageFetchFailed { page: 2, .. })
    ));
    assert_eq!(table.rows(), &before[..]);
    assert!(!table.is_loading());
    assert_eq!(table.state(), ViewState::Ready);
    assert_eq!(table.page(), 2);
    assert_eq!(table.displayed_page(), Some(1));

    // Retry succeeds and clears the error
    table.refresh().unwrap();
    assert!(table.last_error().is_none());
    assert_eq!(table.displayed_page(), Some(2));
}

#[test]
fn test_paged_log_subscription_failure_still_pages() {
    let source = Arc::new(FlakySource::default());
    seed(&source, "p", 12);
    source.fail_subscriptions(true);

    let config = FeedConfig::default().with_page_size(10);
    let mut table = PagedLogViewer::new(Arc::clone(&source), &config).unwrap();
    let result = table.activate(Some(key("p")));

    assert!(matches!(result, Err(FeedError::SubscriptionFailed { .. })));
    assert!(!table.is_subscribed());
    assert_eq!(table.rows().len(), 10);

    table.set_page(2).unwrap();
    assert_eq!(table.rows().len(), 2);
    assert!(matches!(
        table.last_error(),
        Some(FeedError::SubscriptionFailed { .. })
    ));

    source.fail_subscriptions(false);
    table.resubscribe().unwrap();
    assert!(table.is_subscribed());
}

#[test]
fn test_first_page_failure_leaves_empty_view() {
    let source = Arc::new(FlakySource::default());
    seed(&source, "p", 3);
    source.fail_next_queries(1);

    let mut table = PagedLogViewer::new(Arc::clone(&source), &FeedConfig::default()).unwrap();
    let result = table.activate(Some(key("p")));

    assert!(result.is_err());
    assert!(table.rows().is_empty());
    assert!(!table.is_loading());
    assert_eq!(table.displayed_page(), None);
    assert!(table.is_subscribed());
}

// --- Config ---

#[test]
fn test_invalid_config_rejected() {
    let source = Arc::new(FlakySource::default());
    let config = FeedConfig::default().with_page_size(0);

    let result = PagedLogViewer::new(Arc::clone(&source), &config);
    assert!(matches!(result, Err(FeedError::InvalidConfig(_))));

    let config = FeedConfig::default().with_live_capacity(0);
    let result = LiveFeedReconciler::new(source, &config);
    assert!(matches!(result, Err(FeedError::InvalidConfig(_))));
}
