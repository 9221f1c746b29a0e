//! HTTP client for the received-events feed.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, LINK};
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use maintme_core::{
    Event, EventPage, EventSource, GitHubConfig, MaintmeError, MaintmeResult, PageToken,
    Subscriber,
};

use crate::models::WireEvent;

const POLL_INTERVAL: &str = "x-poll-interval";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// [`EventSource`] backed by the GitHub REST API.
///
/// Subscribers without credentials are polled anonymously and only see
/// public events.
#[derive(Clone)]
pub struct GitHubEventSource {
    client: Client,
    config: GitHubConfig,
    api_base: Url,
}

impl GitHubEventSource {
    /// Create a new source.
    pub fn new(config: GitHubConfig) -> MaintmeResult<Self> {
        let api_base = Url::parse(&config.api_url)
            .map_err(|e| MaintmeError::Configuration(format!("Invalid GitHub API URL: {}", e)))?;

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MaintmeError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            api_base,
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    fn first_page_url(&self, login: &str) -> String {
        format!(
            "{}/users/{}/received_events?per_page={}",
            self.config.api_url.trim_end_matches('/'),
            login,
            self.config.per_page.clamp(1, 100)
        )
    }

    /// The URL for a page, refusing continuation links outside the API so
    /// credentials never leave it.
    fn page_url(&self, login: &str, page: Option<PageToken>) -> MaintmeResult<String> {
        let Some(PageToken(link)) = page else {
            return Ok(self.first_page_url(login));
        };
        match Url::parse(&link) {
            Ok(next) if self.within_api(&next) => Ok(link),
            _ => Err(MaintmeError::invalid_response(format!(
                "next page link points outside the API: {}",
                link
            ))),
        }
    }

    fn within_api(&self, link: &Url) -> bool {
        let base = &self.api_base;
        let prefix = base.path().trim_end_matches('/');
        let path = link.path();
        link.scheme() == base.scheme()
            && link.host_str() == base.host_str()
            && link.port_or_known_default() == base.port_or_known_default()
            && (path == prefix || path.starts_with(&format!("{}/", prefix)))
    }
}

#[async_trait]
impl EventSource for GitHubEventSource {
    #[instrument(skip(self, subscriber, page), fields(subscriber_id = subscriber.id, login = %subscriber.github_login))]
    async fn fetch_page(
        &self,
        subscriber: &Subscriber,
        _since: DateTime<Utc>,
        page: Option<PageToken>,
    ) -> MaintmeResult<EventPage> {
        // the events API has no time filter; the poller cuts at the cursor
        let url = self.page_url(&subscriber.github_login, page)?;

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(credentials) = &subscriber.credentials {
            request = request.header(AUTHORIZATION, format!("Bearer {}", credentials.token()));
        }

        let response = request
            .send()
            .await
            .map_err(|e| MaintmeError::transient_fetch(format!("GitHub request failed: {}", e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let remaining = header_u64(&headers, RATE_LIMIT_REMAINING);
            let body = response.text().await.unwrap_or_default();
            return Err(match MaintmeError::from_http_status(status.as_u16(), &body, remaining) {
                MaintmeError::RateLimit { message, .. } => {
                    MaintmeError::rate_limit(message, retry_after(&headers, Utc::now()))
                }
                other => other,
            });
        }

        let wire: Vec<WireEvent> = response
            .json()
            .await
            .map_err(|e| MaintmeError::invalid_response(format!("GitHub events: {}", e)))?;
        let events: Vec<Event> = wire.into_iter().map(Event::from).collect();

        let page = EventPage {
            events,
            next_page: next_link(&headers).map(PageToken),
            poll_interval: header_u64(&headers, POLL_INTERVAL).map(Duration::from_secs),
        };
        debug!(
            events = page.events.len(),
            has_next = page.next_page.is_some(),
            remaining = ?header_u64(&headers, RATE_LIMIT_REMAINING),
            "Fetched GitHub events page"
        );

        Ok(page)
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Seconds until the rate limit window resets.
fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<u64> {
    if let Some(secs) = header_u64(headers, "retry-after") {
        return Some(secs);
    }
    let reset = header_u64(headers, RATE_LIMIT_RESET)?;
    Some((reset as i64 - now.timestamp()).max(0) as u64)
}

/// The `rel="next"` target of a `Link` header.
fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    parse_next_link(link)
}

fn parse_next_link(link: &str) -> Option<String> {
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| p.trim() == r#"rel="next""#);
        if is_next && target.starts_with('<') && target.ends_with('>') {
            Some(target[1..target.len() - 1].to_string())
        } else {
            None
        }
    })
}
