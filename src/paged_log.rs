//! Stable paged view over the full log of the active partition.
//!
//! Rows only ever come from one fetch. Pushes never touch them; they raise
//! `has_new_data` until the caller resyncs with `set_page` or `refresh`.

use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use crate::lifecycle::{Admission, Delivery, FetchOutcome, PumpReport, SubscriptionSlot};
use crate::source::EventSource;
use crate::subscriptions::DropReason;
use crate::types::{EventId, PageQuery, PageResult, PartitionKey, ThreatEvent};
use std::collections::HashSet;

const CONSUMER: &str = "paged_log";

/// Viewer state for one partition activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewState {
    /// No partition is active.
    Idle,
    /// A page fetch is outstanding.
    Loading,
    /// The latest requested fetch has resolved.
    Ready,
}

/// A pending page fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageTicket {
    partition: PartitionKey,
    page: u64,
    generation: u64,
    offset: usize,
    page_size: usize,
}

impl PageTicket {
    pub fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    /// The query to run against the source.
    pub fn query(&self) -> PageQuery {
        PageQuery {
            partition: self.partition.clone(),
            offset: self.offset,
            limit: self.page_size,
        }
    }
}

/// Paginated threat table.
pub struct PagedLogViewer<S: EventSource> {
    source: S,
    page_size: usize,
    slot: SubscriptionSlot,

    partition: Option<PartitionKey>,
    state: ViewState,

    /// Requested page.
    page: u64,
    /// Page the current rows belong to, if any have loaded.
    displayed_page: Option<u64>,
    rows: Vec<ThreatEvent>,
    total_count: u64,

    /// Ids pushed since the last resync.
    new_ids: HashSet<EventId>,

    /// Bumped on every request and every partition change.
    generation: u64,
    last_error: Option<FeedError>,
}

impl<S: EventSource> PagedLogViewer<S> {
    pub fn new(source: S, config: &FeedConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            page_size: config.page_size,
            slot: SubscriptionSlot::new(CONSUMER),
            partition: None,
            state: ViewState::Idle,
            page: 1,
            displayed_page: None,
            rows: Vec::new(),
            total_count: 0,
            new_ids: HashSet::new(),
            generation: 0,
            last_error: None,
        })
    }

    // --- Activation ---

    /// Switch to `partition`: reset to page 1, resubscribe and load.
    ///
    /// The same partition is a no-op; `None` deactivates. A subscription
    /// failure still loads the page and is reported once the fetch succeeds.
    pub fn activate(&mut self, partition: Option<PartitionKey>) -> Result<()> {
        let Some(ticket) = self.begin_activate(partition) else {
            return Ok(());
        };

        self.execute(ticket).into_result()?;

        match (&self.last_error, self.slot.is_bound()) {
            (Some(e), false) => Err(e.clone()),
            _ => Ok(()),
        }
    }

    /// First half of [`activate`](Self::activate): resets the view, binds the
    /// subscription and returns the page 1 fetch to run.
    pub fn begin_activate(&mut self, partition: Option<PartitionKey>) -> Option<PageTicket> {
        if partition.is_some() && partition == self.partition {
            return None;
        }

        self.deactivate();
        let partition = partition?;
        tracing::debug!(consumer = CONSUMER, %partition, "activating");

        self.partition = Some(partition.clone());
        if let Err(e) = self.slot.bind(&self.source, &partition) {
            self.last_error = Some(e);
        }
        Some(self.issue(partition, 1, 0))
    }

    /// Close the subscription and return to `Idle`. Idempotent.
    pub fn deactivate(&mut self) {
        self.slot.release(&self.source);
        if let Some(partition) = self.partition.take() {
            tracing::debug!(consumer = CONSUMER, %partition, "deactivated");
        }
        self.generation += 1;
        self.state = ViewState::Idle;
        self.page = 1;
        self.displayed_page = None;
        self.rows.clear();
        self.total_count = 0;
        self.new_ids.clear();
        self.last_error = None;
    }

    // --- Paging ---

    /// Load page `page` (1-based), replacing the displayed rows.
    pub fn set_page(&mut self, page: u64) -> Result<()> {
        let ticket = self.request_page(page)?;
        self.execute(ticket).into_result()
    }

    /// Re-fetch the current page and clear the new-data signal.
    pub fn refresh(&mut self) -> Result<()> {
        let ticket = self.request_refresh()?;
        self.execute(ticket).into_result()
    }

    /// Start a fetch of `page`. Any earlier outstanding fetch becomes stale.
    ///
    /// A page whose row offset does not fit in `usize` is rejected as
    /// `InvalidPage` and leaves the view untouched.
    pub fn request_page(&mut self, page: u64) -> Result<PageTicket> {
        if page < 1 {
            return Err(FeedError::InvalidPage(page));
        }
        let partition = self.partition.clone().ok_or(FeedError::NoActivePartition)?;
        let offset = usize::try_from(page - 1)
            .ok()
            .and_then(|skipped| skipped.checked_mul(self.page_size))
            .ok_or(FeedError::InvalidPage(page))?;
        Ok(self.issue(partition, page, offset))
    }

    /// Start a fetch of the current page.
    pub fn request_refresh(&mut self) -> Result<PageTicket> {
        self.request_page(self.page)
    }

    /// Run a ticket's query against the source and apply the result.
    pub fn execute(&mut self, ticket: PageTicket) -> FetchOutcome {
        let result = self.source.query_page(&ticket.query());
        self.resolve(ticket, result)
    }

    /// Apply a fetch result if it answers the latest request.
    pub fn resolve(&mut self, ticket: PageTicket, result: Result<PageResult>) -> FetchOutcome {
        if !self.is_current(&ticket) {
            tracing::trace!(
                consumer = CONSUMER,
                partition = %ticket.partition,
                page = ticket.page,
                "discarding stale page"
            );
            return FetchOutcome::StaleResponseDiscarded;
        }

        self.state = ViewState::Ready;
        match result {
            Ok(page) => {
                let fetched = page.rows.len();
                self.rows = page
                    .rows
                    .into_iter()
                    .filter(|row| row.partition == ticket.partition)
                    .collect();
                if self.rows.len() != fetched {
                    tracing::warn!(
                        consumer = CONSUMER,
                        partition = %ticket.partition,
                        dropped = fetched - self.rows.len(),
                        "page rows from another partition dropped"
                    );
                }
                self.total_count = page.total_count;
                self.displayed_page = Some(ticket.page);
                if matches!(self.last_error, Some(FeedError::PageFetchFailed { .. })) {
                    self.last_error = None;
                }
                FetchOutcome::Applied
            }
            Err(e) => {
                let error = FeedError::PageFetchFailed {
                    partition: ticket.partition.clone(),
                    page: ticket.page,
                    reason: e.to_string(),
                };
                tracing::warn!(consumer = CONSUMER, error = %error, "page fetch failed");
                self.last_error = Some(error.clone());
                FetchOutcome::Failed(error)
            }
        }
    }

    /// Record a request for `page` and hand out its ticket. Counts as a resync.
    fn issue(&mut self, partition: PartitionKey, page: u64, offset: usize) -> PageTicket {
        self.generation += 1;
        self.page = page;
        self.state = ViewState::Loading;
        self.new_ids.clear();

        tracing::debug!(consumer = CONSUMER, %partition, page, "requesting page");
        PageTicket {
            partition,
            page,
            generation: self.generation,
            offset,
            page_size: self.page_size,
        }
    }

    fn is_current(&self, ticket: &PageTicket) -> bool {
        ticket.generation == self.generation && self.partition.as_ref() == Some(&ticket.partition)
    }

    // --- Push delivery ---

    /// Note a pushed event. Rows are never touched.
    ///
    /// Nothing is admitted while no subscription is bound, including after
    /// the transport closed it.
    pub fn on_push(&mut self, event: ThreatEvent) -> Admission {
        if !self.slot.is_bound() {
            tracing::trace!(consumer = CONSUMER, "push without a bound subscription");
            return Admission::Inactive;
        }
        self.note_push(event)
    }

    /// Admission for events drained from the bound subscription.
    fn note_push(&mut self, event: ThreatEvent) -> Admission {
        let admission = match &self.partition {
            None => Admission::Inactive,
            Some(_) if self.state == ViewState::Idle => Admission::Inactive,
            Some(active) if event.partition != *active => Admission::PartitionMismatch,
            Some(_) => {
                if self.new_ids.insert(event.id) {
                    Admission::Admitted
                } else {
                    Admission::Duplicate
                }
            }
        };
        if admission != Admission::Admitted {
            tracing::trace!(consumer = CONSUMER, ?admission, "push not admitted");
        }
        admission
    }

    /// Drain the subscription and note everything it delivered.
    pub fn pump(&mut self) -> PumpReport {
        let mut report = PumpReport::default();
        for delivery in self.slot.drain() {
            match delivery {
                Delivery::Insert(event) => report.record(self.note_push(event)),
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

    /// Reopen a subscription that failed or was closed by the transport.
    pub fn resubscribe(&mut self) -> Result<()> {
        let partition = self.partition.clone().ok_or(FeedError::NoActivePartition)?;
        self.slot.bind(&self.source, &partition).map_err(|e| {
            self.last_error = Some(e.clone());
            e
        })
    }

    // --- State surface ---

    pub fn rows(&self) -> &[ThreatEvent] {
        &self.rows
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Requested page (1-based).
    pub fn page(&self) -> u64 {
        self.page
    }

    /// Page the displayed rows came from. Differs from `page` while a fetch
    /// is outstanding or after one failed.
    pub fn displayed_page(&self) -> Option<u64> {
        self.displayed_page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_pages(&self) -> u64 {
        self.total_count.div_ceil(self.page_size as u64)
    }

    pub fn is_loading(&self) -> bool {
        self.state == ViewState::Loading
    }

    pub fn has_new_data(&self) -> bool {
        !self.new_ids.is_empty()
    }

    /// Distinct events pushed since the last resync.
    pub fn new_data_count(&self) -> usize {
        self.new_ids.len()
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn partition(&self) -> Option<&PartitionKey> {
        self.partition.as_ref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.slot.is_bound()
    }

    pub fn last_error(&self) -> Option<&FeedError> {
        self.last_error.as_ref()
    }
}

impl<S: EventSource> Drop for PagedLogViewer<S> {
    fn drop(&mut self) {
        self.slot.release(&self.source);
    }
}
