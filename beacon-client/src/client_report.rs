use beacon_common::DataCategory;
use beacon_protocol::{ClientReport, DiscardReason, DiscardedEvent};
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;

/// Discard counters keyed by reason and category, in the order they were first recorded.
pub type DiscardCounts = IndexMap<(DiscardReason, DataCategory), u64>;

/// Aggregates discarded data until it is sent as a [`ClientReport`].
///
/// The aggregator is shared by the client, the transport and all background workers. Counters
/// are incremented and drained under a lock, so a drain never observes a partial increment.
#[derive(Debug)]
pub struct ClientReportAggregator {
    enabled: bool,
    counts: Mutex<DiscardCounts>,
}

impl ClientReportAggregator {
    /// Creates an empty aggregator.
    ///
    /// A disabled aggregator ignores all records.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            counts: Mutex::new(DiscardCounts::new()),
        }
    }

    /// Adds `quantity` to the counter of `(reason, category)`.
    pub fn record(&self, reason: DiscardReason, category: DataCategory, quantity: u64) {
        if !self.enabled || quantity == 0 {
            return;
        }

        beacon_log::trace!("discarded {quantity} {category} due to {reason}");
        *self.counts.lock().entry((reason, category)).or_insert(0) += quantity;
    }

    /// Returns `true` if nothing has been recorded since the last drain.
    pub fn is_empty(&self) -> bool {
        self.counts.lock().is_empty()
    }

    /// Returns the accumulated counters and resets them.
    pub fn drain(&self) -> DiscardCounts {
        std::mem::take(&mut *self.counts.lock())
    }

    /// Drains the counters into a report, or returns `None` if there is nothing to report.
    pub fn drain_report(&self) -> Option<ClientReport> {
        let counts = self.drain();
        if counts.is_empty() {
            return None;
        }

        let discarded_events = counts
            .into_iter()
            .map(|((reason, category), quantity)| DiscardedEvent {
                reason,
                category,
                quantity,
            })
            .collect();

        Some(ClientReport {
            timestamp: Utc::now(),
            discarded_events,
        })
    }

    /// Returns a copy of the current counters without resetting them.
    pub fn snapshot(&self) -> DiscardCounts {
        self.counts.lock().clone()
    }
}

impl Default for ClientReportAggregator {
    fn default() -> Self {
        Self::new(true)
    }
}
