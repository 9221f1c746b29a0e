//! Fetching: turning a paginated feed into the events of one cycle.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{Stream, TryStreamExt};
use tracing::{debug, warn};

use crate::error::MaintmeResult;
use crate::traits::{EventPage, EventSource, PageToken};
use crate::types::{Event, Subscriber};

/// Events fetched for one cycle.
#[derive(Debug, Default)]
pub struct Fetched {
    /// Events at or after the cursor, oldest first, without repeated ids.
    pub events: Vec<Event>,
    /// Pages requested.
    pub pages: usize,
    /// Longest poll interval any page asked for.
    pub poll_interval: Option<Duration>,
}

struct PageCursor {
    next: Option<PageToken>,
    fetched: usize,
    done: bool,
}

/// Lazily page through the subscriber's feed.
///
/// Each yielded page only holds events created at or after `since`. Paging
/// stops when the source has no further page, when a page reaches back past
/// `since`, or after `max_pages` pages. The boundary is inclusive: events
/// sharing the cursor's timestamp are fetched again and left to the dedup
/// cache, so events recorded late within the same instant are not lost.
pub fn pages<'a>(
    source: &'a dyn EventSource,
    subscriber: &'a Subscriber,
    since: DateTime<Utc>,
    max_pages: usize,
) -> impl Stream<Item = MaintmeResult<EventPage>> + 'a {
    let max_pages = max_pages.max(1);
    let start = PageCursor {
        next: None,
        fetched: 0,
        done: false,
    };

    futures::stream::try_unfold(start, move |state| {
        next_page(source, subscriber, since, max_pages, state)
    })
}

async fn next_page(
    source: &dyn EventSource,
    subscriber: &Subscriber,
    since: DateTime<Utc>,
    max_pages: usize,
    mut state: PageCursor,
) -> MaintmeResult<Option<(EventPage, PageCursor)>> {
    if state.done {
        return Ok(None);
    }
    if state.fetched >= max_pages {
        warn!(
            subscriber_id = subscriber.id,
            max_pages, "Feed not exhausted after page limit, older events skipped"
        );
        return Ok(None);
    }

    let page = source
        .fetch_page(subscriber, since, state.next.take())
        .await?;
    state.fetched += 1;

    let reached_cursor = page.events.iter().any(|e| e.created_at < since);
    state.next = page.next_page;
    state.done = reached_cursor || state.next.is_none();

    let events: Vec<Event> = page
        .events
        .into_iter()
        .filter(|e| e.created_at >= since)
        .collect();

    Ok(Some((
        EventPage {
            events,
            next_page: state.next.clone(),
            poll_interval: page.poll_interval,
        },
        state,
    )))
}

/// Fetch every event at or after `since`, oldest first.
pub async fn collect_since(
    source: &dyn EventSource,
    subscriber: &Subscriber,
    since: DateTime<Utc>,
    max_pages: usize,
) -> MaintmeResult<Fetched> {
    let mut fetched = Fetched::default();
    let mut ids = HashSet::new();
    let mut stream = Box::pin(pages(source, subscriber, since, max_pages));

    while let Some(page) = stream.try_next().await? {
        fetched.pages += 1;
        if let Some(interval) = page.poll_interval {
            fetched.poll_interval = Some(fetched.poll_interval.map_or(interval, |p| p.max(interval)));
        }
        // pages shift while new events arrive, so an event can show up twice
        for event in page.events {
            if ids.insert(event.id.clone()) {
                fetched.events.push(event);
            }
        }
    }

    // feeds are newest first; reverse before the stable sort so events with
    // equal timestamps keep their relative feed order
    fetched.events.reverse();
    fetched.events.sort_by_key(|e| e.created_at);

    debug!(
        subscriber_id = subscriber.id,
        pages = fetched.pages,
        events = fetched.events.len(),
        "Fetched events"
    );
    Ok(fetched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MaintmeError;
    use crate::traits::MockEventSource;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use mockall::predicate::eq;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 7, 3, 0, 0, 0).unwrap() + ChronoDuration::seconds(secs)
    }

    fn event(id: &str, secs: i64) -> Event {
        Event::new(id, "IssuesEvent", at(secs))
    }

    fn page(events: Vec<Event>, next: Option<&str>) -> EventPage {
        EventPage {
            events,
            next_page: next.map(|n| PageToken(n.to_string())),
            poll_interval: None,
        }
    }

    #[tokio::test]
    async fn test_follows_pages_until_exhausted() {
        let mut source = MockEventSource::new();
        source
            .expect_fetch_page()
            .with(mockall::predicate::always(), eq(at(0)), eq(None))
            .times(1)
            .returning(|_, _, _| Ok(page(vec![event("4", 40), event("3", 30)], Some("2"))));
        source
            .expect_fetch_page()
            .with(
                mockall::predicate::always(),
                eq(at(0)),
                eq(Some(PageToken("2".to_string()))),
            )
            .times(1)
            .returning(|_, _, _| Ok(page(vec![event("2", 20), event("1", 10)], None)));

        let sub = Subscriber::new(1, "octocat");
        let fetched = collect_since(&source, &sub, at(0), 10).await.unwrap();

        let ids: Vec<_> = fetched.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
        assert_eq!(fetched.pages, 2);
    }

    #[tokio::test]
    async fn test_stops_at_cursor_boundary() {
        let mut source = MockEventSource::new();
        source
            .expect_fetch_page()
            .times(1)
            .returning(|_, _, _| {
                Ok(page(
                    vec![event("3", 30), event("2", 20), event("1", 10)],
                    Some("2"),
                ))
            });

        let sub = Subscriber::new(1, "octocat");
        let fetched = collect_since(&source, &sub, at(20), 10).await.unwrap();

        // inclusive boundary keeps the event at the cursor
        let ids: Vec<_> = fetched.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert_eq!(fetched.pages, 1);
    }

    #[tokio::test]
    async fn test_page_limit() {
        let mut source = MockEventSource::new();
        source
            .expect_fetch_page()
            .times(2)
            .returning(|_, _, page_token| {
                let n = if page_token.is_none() { 100 } else { 50 };
                Ok(page(vec![event(&n.to_string(), n)], Some("more")))
            });

        let sub = Subscriber::new(1, "octocat");
        let fetched = collect_since(&source, &sub, at(0), 2).await.unwrap();
        assert_eq!(fetched.pages, 2);
        assert_eq!(fetched.events.len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_ids_and_out_of_order_timestamps() {
        let mut source = MockEventSource::new();
        source
            .expect_fetch_page()
            .with(mockall::predicate::always(), mockall::predicate::always(), eq(None))
            .returning(|_, _, _| Ok(page(vec![event("b", 15), event("c", 30)], Some("2"))));
        source
            .expect_fetch_page()
            .with(
                mockall::predicate::always(),
                mockall::predicate::always(),
                eq(Some(PageToken("2".to_string()))),
            )
            .returning(|_, _, _| Ok(page(vec![event("c", 30), event("a", 10)], None)));

        let sub = Subscriber::new(1, "octocat");
        let fetched = collect_since(&source, &sub, at(0), 10).await.unwrap();
        let ids: Vec<_> = fetched.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_poll_interval_is_longest_requested() {
        let mut source = MockEventSource::new();
        source.expect_fetch_page().returning(|_, _, token| {
            let mut p = page(vec![], if token.is_none() { Some("2") } else { None });
            p.poll_interval = Some(Duration::from_secs(if token.is_none() { 60 } else { 120 }));
            Ok(p)
        });

        let sub = Subscriber::new(1, "octocat");
        let fetched = collect_since(&source, &sub, at(0), 10).await.unwrap();
        assert_eq!(fetched.poll_interval, Some(Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn test_error_propagates() {
        let mut source = MockEventSource::new();
        source
            .expect_fetch_page()
            .returning(|_, _, _| Err(MaintmeError::transient_fetch("connection reset")));

        let sub = Subscriber::new(1, "octocat");
        let err = collect_since(&source, &sub, at(0), 10).await.unwrap_err();
        assert!(err.is_transient());
    }
}
