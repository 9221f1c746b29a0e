//! Store trait for subscriber state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MaintmeResult;
use crate::types::{Filter, Subscriber, SubscriberId};

/// Persistent subscriber state consumed by the poller.
///
/// Any error returned from a `Store` is treated as fatal by the poller:
/// cursor persistence is required for correct duplicate suppression.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// All subscribers that are currently active.
    async fn list_active_subscribers(&self) -> MaintmeResult<Vec<Subscriber>>;

    /// The subscriber's filters with their conditions, both in creation order.
    async fn load_filters(&self, subscriber_id: SubscriberId) -> MaintmeResult<Vec<Filter>>;

    /// Persist the outcome of a successful poll cycle.
    async fn commit_poll_result(
        &self,
        subscriber_id: SubscriberId,
        last_seen_created_at: DateTime<Utc>,
        next_poll_at: DateTime<Utc>,
    ) -> MaintmeResult<()>;

    /// Stop polling a subscriber until it is re-authorized.
    async fn deactivate_subscriber(&self, subscriber_id: SubscriberId, reason: &str) -> MaintmeResult<()>;
}
