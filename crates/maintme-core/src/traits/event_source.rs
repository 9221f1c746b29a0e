//! Event source trait and page types.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MaintmeResult;
use crate::types::{Event, Subscriber};

/// Opaque continuation token for the next page of a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(pub String);

/// One page of the activity feed.
#[derive(Debug, Clone, Default)]
pub struct EventPage {
    /// Events in feed order, newest first.
    pub events: Vec<Event>,
    /// Token for the next (older) page, `None` when exhausted.
    pub next_page: Option<PageToken>,
    /// Minimum poll interval requested by the feed, if any.
    pub poll_interval: Option<Duration>,
}

impl EventPage {
    /// A final page holding the given events.
    pub fn last(events: Vec<Event>) -> Self {
        Self {
            events,
            next_page: None,
            poll_interval: None,
        }
    }
}

/// An activity feed, read page by page.
///
/// Failures are reported as `MaintmeError::TransientFetch` or
/// `MaintmeError::RateLimit` when a retry may succeed, and as
/// `MaintmeError::Authentication` when the subscriber's credentials are
/// rejected.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch one page of events for the subscriber.
    ///
    /// `since` is a hint; sources whose API cannot filter by time return full
    /// pages and leave the cut-off to the caller.
    async fn fetch_page(
        &self,
        subscriber: &Subscriber,
        since: DateTime<Utc>,
        page: Option<PageToken>,
    ) -> MaintmeResult<EventPage>;
}
