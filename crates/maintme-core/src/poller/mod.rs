//! The subscriber poller.
//!
//! A single ticking loop. Every tick lists the active subscribers, picks the
//! ones whose `next_poll_at` falls before the middle of the tick and runs one
//! cycle for each of them, at most `max_concurrency` at a time:
//!
//! ```text
//! Idle -> Fetching -> Deciding -> Notifying -> Committing -> Idle
//! ```
//!
//! A long tick delays the next one instead of overlapping it. Cancelling the
//! token aborts in-flight cycles before they commit, so their events are
//! fetched again by the next run.

mod cycle;
pub mod fetch;
mod report;

pub use report::{CycleOutcome, CycleReport, TickReport};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::dedup::{DedupCache, DedupConfig};
use crate::error::{MaintmeError, MaintmeResult};
use crate::traits::{EventSource, Notifier, Store};
use crate::types::SubscriberId;

/// Configuration for the poller loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between ticks (default: 60)
    pub tick_interval_secs: u64,
    /// Subscriber cycles running at the same time (default: 4)
    pub max_concurrency: usize,
    /// Feed pages fetched per cycle at most (default: 10)
    pub max_pages: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            max_concurrency: 4,
            max_pages: 10,
        }
    }
}

impl PollerConfig {
    /// Create config with a custom tick interval.
    pub fn with_tick_interval(secs: u64) -> Self {
        Self {
            tick_interval_secs: secs.max(1),
            ..Default::default()
        }
    }

    /// Tick interval as a duration.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }
}

/// Drives poll cycles for every subscriber in the store.
pub struct Poller {
    store: Arc<dyn Store>,
    source: Arc<dyn EventSource>,
    notifier: Arc<dyn Notifier>,
    dedup: DedupCache,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
    in_flight: Mutex<HashSet<SubscriberId>>,
}

impl Poller {
    /// Create a poller using the system clock.
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn EventSource>,
        notifier: Arc<dyn Notifier>,
        config: PollerConfig,
        dedup: &DedupConfig,
    ) -> Self {
        Self::with_clock(store, source, notifier, config, dedup, Arc::new(SystemClock))
    }

    /// Create a poller whose schedule and dedup cache follow `clock`.
    pub fn with_clock(
        store: Arc<dyn Store>,
        source: Arc<dyn EventSource>,
        notifier: Arc<dyn Notifier>,
        config: PollerConfig,
        dedup: &DedupConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            source,
            notifier,
            dedup: DedupCache::with_clock(dedup, clock.clone()),
            clock,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Get the poller configuration.
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Get the dedup cache.
    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    /// Run ticks until `cancel` fires.
    ///
    /// Returns `Ok(())` once cancelled and the error of the first fatal
    /// failure otherwise.
    pub async fn run(&self, cancel: CancellationToken) -> MaintmeResult<()> {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tick_interval_secs = self.config.tick_interval_secs,
            max_concurrency = self.config.max_concurrency,
            "Poller started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let report = self.tick(&cancel).await?;
            let purged = self.dedup.purge_expired();

            info!(
                subscribers = report.subscribers,
                due = report.due,
                completed = report.completed,
                fetch_failed = report.fetch_failed,
                deactivated = report.deactivated,
                delivered = report.delivered,
                delivery_failures = report.delivery_failures,
                duplicates = report.duplicates,
                purged,
                "Tick complete"
            );

            if cancel.is_cancelled() {
                break;
            }
        }

        info!("Poller stopped");
        Ok(())
    }

    /// Run one tick: a cycle for every active subscriber that is due.
    ///
    /// Subscriber failures that only concern one subscriber are reported in
    /// the returned [`TickReport`]. A fatal failure drops the remaining
    /// cycles and is returned.
    pub async fn tick(&self, cancel: &CancellationToken) -> MaintmeResult<TickReport> {
        let started_at = self.clock.now();
        let subscribers = self.store.list_active_subscribers().await?;

        let mut report = TickReport {
            subscribers: subscribers.len(),
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut cycles = FuturesUnordered::new();

        let due_before = self.due_cutoff(started_at);
        for subscriber in subscribers.into_iter().filter(|s| s.is_due(due_before)) {
            report.due += 1;

            let Some(guard) = self.claim(subscriber.id) else {
                debug!(subscriber_id = subscriber.id, "Previous cycle still running, skipping");
                report.skipped_in_flight += 1;
                continue;
            };
            let semaphore = semaphore.clone();

            cycles.push(async move {
                let _guard = guard;
                let id = subscriber.id;
                let work = async {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|_| MaintmeError::internal("poller semaphore closed"))?;
                    self.cycle(&subscriber, started_at).await
                };

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Ok(CycleOutcome::Cancelled { subscriber_id: id }),
                    outcome = work => outcome,
                }
            });
        }

        while let Some(outcome) = cycles.next().await {
            report.record(&outcome?);
        }

        Ok(report)
    }

    /// Start the loop on the runtime and return a handle to stop it.
    pub fn spawn(self) -> PollerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let join = tokio::spawn(async move { self.run(token).await });
        PollerHandle { cancel, join }
    }

    fn claim(&self, id: SubscriberId) -> Option<InFlight<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.insert(id).then_some(InFlight {
            set: &self.in_flight,
            id,
        })
    }

    /// Time until the next poll: the feed's requested interval rounded up to
    /// whole ticks, at least one tick.
    fn poll_wait(&self, requested: Option<Duration>) -> chrono::Duration {
        let tick = self.config.tick_interval().as_secs();
        let requested = requested.map_or(0, |r| r.as_secs() + u64::from(r.subsec_nanos() > 0));
        let wait = requested.div_ceil(tick).max(1).saturating_mul(tick);
        i64::try_from(wait)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| chrono::Duration::seconds(tick as i64))
    }

    /// Cutoff for `next_poll_at` in a tick started at `started_at`.
    ///
    /// Ticks fire on a schedule but are stamped with the wall clock, so a
    /// tick may start slightly before the `next_poll_at` committed one tick
    /// earlier. Anything due before the middle of the tick counts as due.
    fn due_cutoff(&self, started_at: DateTime<Utc>) -> DateTime<Utc> {
        let half_tick = self.config.tick_interval().as_millis() / 2;
        started_at + chrono::Duration::milliseconds(half_tick as i64)
    }
}

/// Marks a subscriber as having a cycle in progress until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<SubscriberId>>,
    id: SubscriberId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

/// Handle to a poller started with [`Poller::spawn`].
pub struct PollerHandle {
    /// Cancels the loop when triggered.
    pub cancel: CancellationToken,
    /// The loop's task.
    pub join: JoinHandle<MaintmeResult<()>>,
}

impl PollerHandle {
    /// Cancel the loop and wait for it to finish.
    pub async fn shutdown(self) -> MaintmeResult<()> {
        self.cancel.cancel();
        self.join
            .await
            .map_err(|e| MaintmeError::internal(format!("poller task failed: {}", e)))?
    }
}
