//! Core types for the threat feed.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

/// Unique identifier for an event. Stable across redelivery.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        EventId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The project an event belongs to. Events never move between partitions.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(pub String);

impl PartitionKey {
    pub fn new(key: impl Into<String>) -> Self {
        PartitionKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionKey({})", self.0)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(s: &str) -> Self {
        PartitionKey(s.to_string())
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time. A clock before the epoch reads as zero.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }

    pub fn from_secs(secs: i64) -> Self {
        Timestamp(secs * 1_000_000)
    }

    pub fn saturating_sub_micros(self, micros: i64) -> Self {
        Timestamp(self.0.saturating_sub(micros))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Classification attached to an event by the analyzer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Verdict {
    pub is_threat: bool,

    #[serde(default)]
    pub confidence: f64,

    #[serde(default)]
    pub reason: String,
}

impl Verdict {
    pub fn threat(confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            is_threat: true,
            confidence,
            reason: reason.into(),
        }
    }

    pub fn allow(confidence: f64) -> Self {
        Self {
            is_threat: false,
            confidence,
            reason: String::new(),
        }
    }
}

/// One classified request in the append-only threat log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreatEvent {
    pub id: EventId,

    #[serde(rename = "project_id")]
    pub partition: PartitionKey,

    /// Event time, not arrival time.
    pub timestamp: Timestamp,

    #[serde(flatten)]
    pub verdict: Verdict,

    #[serde(default)]
    pub ip: String,

    #[serde(default)]
    pub route: String,

    #[serde(default)]
    pub method: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ThreatEvent {
    /// Decode a raw insert payload as delivered by the push channel.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Feed order: newest first, with `id` breaking timestamp ties.
    pub fn feed_order(&self, other: &Self) -> Ordering {
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Input for appending a new event (before id/timestamp are assigned).
#[derive(Clone, Debug)]
pub struct EventInput {
    pub partition: PartitionKey,
    pub verdict: Verdict,
    pub ip: String,
    pub route: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub metadata: HashMap<String, String>,
}

impl EventInput {
    /// A request with the given verdict and empty request context.
    pub fn new(partition: impl Into<PartitionKey>, verdict: Verdict) -> Self {
        Self {
            partition: partition.into(),
            verdict,
            ip: String::new(),
            route: String::new(),
            method: String::new(),
            headers: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Set the request line.
    pub fn with_request(
        mut self,
        method: impl Into<String>,
        route: impl Into<String>,
        ip: impl Into<String>,
    ) -> Self {
        self.method = method.into();
        self.route = route.into();
        self.ip = ip.into();
        self
    }

    /// Add a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Build the event with a known id and event time (backfill, replay).
    pub fn into_event(self, id: EventId, timestamp: Timestamp) -> ThreatEvent {
        ThreatEvent {
            id,
            partition: self.partition,
            timestamp,
            verdict: self.verdict,
            ip: self.ip,
            route: self.route,
            method: self.method,
            headers: self.headers,
            metadata: self.metadata,
        }
    }
}

/// A point-in-time page request against one partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageQuery {
    pub partition: PartitionKey,
    pub offset: usize,
    pub limit: usize,
}

/// Rows of one page plus the partition's total row count.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageResult {
    pub rows: Vec<ThreatEvent>,
    pub total_count: u64,
}
