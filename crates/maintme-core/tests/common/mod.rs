//! In-memory collaborators shared by the poller integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Semaphore;
use maintme_core::{
    DedupConfig, Event, EventPage, EventSource, Filter, MaintmeError, MaintmeResult, ManualClock,
    Notifier, PageToken, Poller, PollerConfig, Store, Subscriber, SubscriberId,
};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 7, 3, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

#[derive(Default)]
struct StoreState {
    subscribers: Vec<Subscriber>,
    filters: HashMap<SubscriberId, Vec<Filter>>,
    commits: Vec<(SubscriberId, DateTime<Utc>, DateTime<Utc>)>,
    deactivated: Vec<(SubscriberId, String)>,
    fail_commits: bool,
}

/// Store holding everything in memory. Panics if a cursor would regress.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn add_subscriber(&self, subscriber: Subscriber, filters: Vec<Filter>) {
        let mut state = self.state.lock().unwrap();
        state.filters.insert(subscriber.id, filters);
        state.subscribers.push(subscriber);
    }

    pub fn subscriber(&self, id: SubscriberId) -> Subscriber {
        let state = self.state.lock().unwrap();
        state.subscribers.iter().find(|s| s.id == id).cloned().unwrap()
    }

    pub fn commits(&self) -> Vec<(SubscriberId, DateTime<Utc>, DateTime<Utc>)> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn deactivated(&self) -> Vec<SubscriberId> {
        self.state
            .lock()
            .unwrap()
            .deactivated
            .iter()
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn fail_commits(&self) {
        self.state.lock().unwrap().fail_commits = true;
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn list_active_subscribers(&self) -> MaintmeResult<Vec<Subscriber>> {
        let state = self.state.lock().unwrap();
        Ok(state.subscribers.iter().filter(|s| s.active).cloned().collect())
    }

    async fn load_filters(&self, subscriber_id: SubscriberId) -> MaintmeResult<Vec<Filter>> {
        let state = self.state.lock().unwrap();
        Ok(state.filters.get(&subscriber_id).cloned().unwrap_or_default())
    }

    async fn commit_poll_result(
        &self,
        subscriber_id: SubscriberId,
        last_seen_created_at: DateTime<Utc>,
        next_poll_at: DateTime<Utc>,
    ) -> MaintmeResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_commits {
            return Err(MaintmeError::store("commit_poll_result", "disk I/O error"));
        }
        let sub = state
            .subscribers
            .iter_mut()
            .find(|s| s.id == subscriber_id)
            .unwrap();
        assert!(
            last_seen_created_at >= sub.last_seen_created_at,
            "cursor regressed for subscriber {}",
            subscriber_id
        );
        sub.last_seen_created_at = last_seen_created_at;
        sub.next_poll_at = next_poll_at;
        state
            .commits
            .push((subscriber_id, last_seen_created_at, next_poll_at));
        Ok(())
    }

    async fn deactivate_subscriber(&self, subscriber_id: SubscriberId, reason: &str) -> MaintmeResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(sub) = state.subscribers.iter_mut().find(|s| s.id == subscriber_id) {
            sub.active = false;
        }
        state.deactivated.push((subscriber_id, reason.to_string()));
        Ok(())
    }
}

#[derive(Clone, Copy)]
pub enum Failure {
    Transient,
    Unauthorized,
    Hang,
}

#[derive(Default)]
struct SourceState {
    feeds: HashMap<String, Vec<Event>>,
    failures: HashMap<String, Failure>,
    requests: usize,
}

/// Feed serving fixed events per login, newest first, `page_size` per page.
pub struct FakeSource {
    state: Mutex<SourceState>,
    page_size: usize,
    poll_interval: Option<Duration>,
}

impl FakeSource {
    pub fn new(page_size: usize) -> Self {
        Self {
            state: Mutex::new(SourceState::default()),
            page_size,
            poll_interval: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn set_feed(&self, login: &str, events: Vec<Event>) {
        self.state
            .lock()
            .unwrap()
            .feeds
            .insert(login.to_string(), events);
    }

    pub fn fail(&self, login: &str, failure: Failure) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(login.to_string(), failure);
    }

    pub fn recover(&self, login: &str) {
        self.state.lock().unwrap().failures.remove(login);
    }

    pub fn requests(&self) -> usize {
        self.state.lock().unwrap().requests
    }
}

#[async_trait]
impl EventSource for FakeSource {
    async fn fetch_page(
        &self,
        subscriber: &Subscriber,
        _since: DateTime<Utc>,
        page: Option<PageToken>,
    ) -> MaintmeResult<EventPage> {
        let (failure, mut events) = {
            let mut state = self.state.lock().unwrap();
            state.requests += 1;
            (
                state.failures.get(&subscriber.github_login).copied(),
                state
                    .feeds
                    .get(&subscriber.github_login)
                    .cloned()
                    .unwrap_or_default(),
            )
        };

        match failure {
            Some(Failure::Transient) => {
                return Err(MaintmeError::from_http_status(502, "bad gateway", None))
            }
            Some(Failure::Unauthorized) => {
                return Err(MaintmeError::from_http_status(401, "Bad credentials", None))
            }
            Some(Failure::Hang) => futures::future::pending::<()>().await,
            None => {}
        }

        // the feed itself orders by arrival, not by timestamp
        events.reverse();

        let offset: usize = page.map(|p| p.0.parse().unwrap()).unwrap_or(0);
        let end = (offset + self.page_size).min(events.len());
        let next_page = (end < events.len()).then(|| PageToken(end.to_string()));

        Ok(EventPage {
            events: events[offset.min(end)..end].to_vec(),
            next_page,
            poll_interval: self.poll_interval,
        })
    }
}

/// Empty feed whose requests wait until the gate is opened, tracking how
/// many are waiting at once.
pub struct GatedSource {
    gate: Semaphore,
    current: AtomicUsize,
    peak: AtomicUsize,
    requests: AtomicUsize,
}

impl GatedSource {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(1);
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Wait until `n` requests are held at the gate.
    pub async fn wait_for(&self, n: usize) {
        while self.current() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl EventSource for GatedSource {
    async fn fetch_page(
        &self,
        _subscriber: &Subscriber,
        _since: DateTime<Utc>,
        _page: Option<PageToken>,
    ) -> MaintmeResult<EventPage> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let permit = self.gate.acquire().await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        drop(permit);

        Ok(EventPage::last(vec![]))
    }
}

/// Records deliveries; can be told to reject specific event ids.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(SubscriberId, String)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(SubscriberId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_ids(&self, subscriber_id: SubscriberId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == subscriber_id)
            .map(|(_, event)| event)
            .collect()
    }

    pub fn fail_on(&self, event_id: &str) {
        self.failing.lock().unwrap().insert(event_id.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, subscriber_id: SubscriberId, event: &Event) -> MaintmeResult<()> {
        if self.failing.lock().unwrap().contains(&event.id) {
            return Err(MaintmeError::delivery("sink unavailable"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((subscriber_id, event.id.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<FakeStore>,
    pub source: Arc<FakeSource>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub poller: Poller,
}

impl Harness {
    pub fn new(source: FakeSource) -> Self {
        let store = Arc::new(FakeStore::default());
        let source = Arc::new(source);
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new(at(3600)));

        let poller = Poller::with_clock(
            store.clone(),
            source.clone(),
            notifier.clone(),
            PollerConfig::default(),
            &DedupConfig::default(),
            clock.clone(),
        );

        Self {
            store,
            source,
            notifier,
            clock,
            poller,
        }
    }

    /// Advance past every subscriber's next poll time.
    pub fn advance_tick(&self) {
        self.clock.advance(chrono::Duration::seconds(60));
    }
}
