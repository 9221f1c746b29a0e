//! Per-cycle and per-tick summaries.

use chrono::{DateTime, Utc};

use crate::types::SubscriberId;

/// Counters for one subscriber's completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub subscriber_id: SubscriberId,
    pub fetched: usize,
    pub accepted: usize,
    pub discarded: usize,
    pub duplicates: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
    pub malformed_filters: usize,
    /// Cursor persisted at the end of the cycle.
    pub cursor: DateTime<Utc>,
    /// Next poll time persisted at the end of the cycle.
    pub next_poll_at: DateTime<Utc>,
}

impl CycleReport {
    pub(crate) fn new(subscriber_id: SubscriberId, cursor: DateTime<Utc>) -> Self {
        Self {
            subscriber_id,
            fetched: 0,
            accepted: 0,
            discarded: 0,
            duplicates: 0,
            delivered: 0,
            delivery_failures: 0,
            malformed_filters: 0,
            cursor,
            next_poll_at: cursor,
        }
    }
}

/// How a subscriber's cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cycle ran to the commit.
    Completed(CycleReport),
    /// Fetching failed in a way that may succeed next tick.
    FetchFailed {
        subscriber_id: SubscriberId,
        error: String,
    },
    /// The feed rejected the subscriber's credentials.
    Deactivated { subscriber_id: SubscriberId },
    /// The poller was cancelled before the cycle committed.
    Cancelled { subscriber_id: SubscriberId },
}

/// Totals for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub subscribers: usize,
    pub due: usize,
    pub completed: usize,
    pub fetch_failed: usize,
    pub deactivated: usize,
    pub cancelled: usize,
    pub skipped_in_flight: usize,
    pub fetched: usize,
    pub accepted: usize,
    pub discarded: usize,
    pub duplicates: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
    pub malformed_filters: usize,
}

impl TickReport {
    pub(crate) fn record(&mut self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Completed(r) => {
                self.completed += 1;
                self.fetched += r.fetched;
                self.accepted += r.accepted;
                self.discarded += r.discarded;
                self.duplicates += r.duplicates;
                self.delivered += r.delivered;
                self.delivery_failures += r.delivery_failures;
                self.malformed_filters += r.malformed_filters;
            }
            CycleOutcome::FetchFailed { .. } => self.fetch_failed += 1,
            CycleOutcome::Deactivated { .. } => self.deactivated += 1,
            CycleOutcome::Cancelled { .. } => self.cancelled += 1,
        }
    }
}
