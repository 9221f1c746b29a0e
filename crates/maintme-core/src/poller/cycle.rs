//! One subscriber's poll cycle:
//! `Fetching -> Deciding -> Notifying -> Committing`.

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::error::MaintmeResult;
use crate::poller::fetch::collect_since;
use crate::poller::report::{CycleOutcome, CycleReport};
use crate::poller::Poller;
use crate::rules::{Decision, RuleSet};
use crate::types::Subscriber;

impl Poller {
    /// Run one cycle for a subscriber.
    ///
    /// Only store failures are returned as errors; everything else ends in a
    /// [`CycleOutcome`].
    pub(crate) async fn cycle(
        &self,
        subscriber: &Subscriber,
        tick_started_at: DateTime<Utc>,
    ) -> MaintmeResult<CycleOutcome> {
        let id = subscriber.id;
        let cursor = subscriber.last_seen_created_at;

        let filters = self
            .store
            .load_filters(id)
            .await
            .map_err(|e| e.for_subscriber(id))?;
        let rules = RuleSet::compile(&filters);

        // Fetching
        let fetched = match collect_since(
            self.source.as_ref(),
            subscriber,
            cursor,
            self.config.max_pages,
        )
        .await
        {
            Ok(fetched) => fetched,
            Err(e) if e.is_auth() => {
                error!(
                    subscriber_id = id,
                    login = %subscriber.github_login,
                    error = %e,
                    "Feed rejected credentials, deactivating subscriber"
                );
                self.store
                    .deactivate_subscriber(id, &e.to_string())
                    .await
                    .map_err(|e| e.for_subscriber(id))?;
                return Ok(CycleOutcome::Deactivated { subscriber_id: id });
            }
            Err(e) if e.is_fatal() => return Err(e.for_subscriber(id)),
            Err(e) => {
                warn!(subscriber_id = id, error = %e, "Fetch failed, retrying next tick");
                return Ok(CycleOutcome::FetchFailed {
                    subscriber_id: id,
                    error: e.to_string(),
                });
            }
        };

        let mut report = CycleReport::new(id, cursor);
        report.fetched = fetched.events.len();
        report.malformed_filters = rules.malformed().len();

        let mut newest = cursor;
        let mut earliest_failure: Option<DateTime<Utc>> = None;

        for event in &fetched.events {
            // Deciding
            newest = newest.max(event.created_at);
            let verdict = rules.decide(event, subscriber.filter_default_discard);
            debug!(
                subscriber_id = id,
                event_id = %event.id,
                decision = %verdict.decision,
                reason = ?verdict.reason,
                "Decided event"
            );

            if verdict.decision == Decision::Discard {
                report.discarded += 1;
                continue;
            }
            report.accepted += 1;

            // Notifying
            if self.dedup.seen(id, &event.id) {
                report.duplicates += 1;
                continue;
            }
            match self.notifier.send(id, event).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    self.dedup.forget(id, &event.id);
                    report.delivery_failures += 1;
                    earliest_failure = Some(
                        earliest_failure.map_or(event.created_at, |t| t.min(event.created_at)),
                    );
                    error!(
                        subscriber_id = id,
                        event_id = %event.id,
                        error = %e,
                        "Delivery failed, event will be fetched again"
                    );
                }
            }
        }

        // Committing
        let mut candidate = newest;
        if let Some(failed_at) = earliest_failure {
            // fetching is inclusive of the cursor, so the failed event comes back
            candidate = candidate.min(failed_at);
        }
        let next_cursor = cursor.max(candidate);
        let next_poll_at = tick_started_at + self.poll_wait(fetched.poll_interval);

        self.store
            .commit_poll_result(id, next_cursor, next_poll_at)
            .await
            .map_err(|e| e.for_subscriber(id))?;

        report.cursor = next_cursor;
        report.next_poll_at = next_poll_at;
        debug!(
            subscriber_id = id,
            cursor = %next_cursor,
            next_poll_at = %next_poll_at,
            delivered = report.delivered,
            "Committed poll result"
        );

        Ok(CycleOutcome::Completed(report))
    }
}
