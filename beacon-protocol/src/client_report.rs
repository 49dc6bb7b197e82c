use std::fmt;

use beacon_common::DataCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The reason why the client dropped data instead of sending it.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Dropped by client-side sampling.
    SampleRate,
    /// An event processor returned no event.
    EventProcessor,
    /// A before-send hook returned no event.
    BeforeSend,
    /// The background worker queue was full.
    QueueOverflow,
    /// The category is rate limited by the collector.
    RatelimitBackoff,
    /// Sending failed.
    NetworkError,
}

impl DiscardReason {
    /// Returns the name of the reason as it appears in client reports.
    pub fn name(self) -> &'static str {
        match self {
            Self::SampleRate => "sample_rate",
            Self::EventProcessor => "event_processor",
            Self::BeforeSend => "before_send",
            Self::QueueOverflow => "queue_overflow",
            Self::RatelimitBackoff => "ratelimit_backoff",
            Self::NetworkError => "network_error",
        }
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The number of items dropped for a reason and category.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct DiscardedEvent {
    /// Why the items were dropped.
    pub reason: DiscardReason,
    /// What kind of items were dropped.
    pub category: DataCategory,
    /// How many items were dropped.
    pub quantity: u64,
}

/// A report of data the client discarded since the previous report.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ClientReport {
    /// The timestamp of when the report was created.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    /// Discard counters in the order they were first recorded.
    pub discarded_events: Vec<DiscardedEvent>,
}

impl ClientReport {
    /// Parses a client report from JSON.
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Serializes a client report into JSON.
    pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
