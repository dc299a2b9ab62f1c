//! Read-only summaries over a slice of events.

use crate::types::{ThreatEvent, Timestamp};
use std::time::Duration;

/// Verdict totals.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeedStats {
    pub total: usize,
    pub blocked: usize,
    pub allowed: usize,
    /// `None` for an empty slice.
    pub mean_confidence: Option<f64>,
}

impl FeedStats {
    pub fn from_events(events: &[ThreatEvent]) -> Self {
        if events.is_empty() {
            return Self::default();
        }

        let blocked = events.iter().filter(|e| e.verdict.is_threat).count();
        let confidence_sum: f64 = events.iter().map(|e| e.verdict.confidence).sum();

        Self {
            total: events.len(),
            blocked,
            allowed: events.len() - blocked,
            mean_confidence: Some(confidence_sum / events.len() as f64),
        }
    }

    /// Fraction of events blocked, 0.0 when empty.
    pub fn block_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.blocked as f64 / self.total as f64
        }
    }
}

/// One histogram bucket covering `[start, start + width)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistogramBucket {
    pub start: Timestamp,
    pub events: usize,
    pub threats: usize,
}

/// Event counts over a trailing window of equal-width buckets, oldest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityHistogram {
    pub width: Duration,
    pub buckets: Vec<HistogramBucket>,
}

impl ActivityHistogram {
    pub const DEFAULT_BUCKETS: usize = 10;
    pub const DEFAULT_WIDTH: Duration = Duration::from_secs(60);

    /// Ten one-minute buckets ending at `now`.
    pub fn trailing_minutes(events: &[ThreatEvent], now: Timestamp) -> Self {
        Self::from_events(events, now, Self::DEFAULT_BUCKETS, Self::DEFAULT_WIDTH)
    }

    /// Bucket `events` into `buckets` slots of `width` ending at `now`.
    ///
    /// Events outside the window (including ones stamped after `now`) are
    /// not counted. An event exactly at `now` lands in the last bucket.
    pub fn from_events(
        events: &[ThreatEvent],
        now: Timestamp,
        buckets: usize,
        width: Duration,
    ) -> Self {
        let width_micros = (width.as_micros() as i64).max(1);
        let window_start = now.saturating_sub_micros(width_micros.saturating_mul(buckets as i64));

        let mut slots: Vec<HistogramBucket> = (0..buckets)
            .map(|i| HistogramBucket {
                start: Timestamp(window_start.0 + width_micros * i as i64),
                events: 0,
                threats: 0,
            })
            .collect();

        if buckets > 0 {
            for event in events {
                let ts = event.timestamp;
                if ts < window_start || ts > now {
                    continue;
                }
                let idx = (((ts.0 - window_start.0) / width_micros) as usize).min(buckets - 1);
                slots[idx].events += 1;
                if event.verdict.is_threat {
                    slots[idx].threats += 1;
                }
            }
        }

        Self {
            width,
            buckets: slots,
        }
    }

    pub fn total_events(&self) -> usize {
        self.buckets.iter().map(|b| b.events).sum()
    }
}
