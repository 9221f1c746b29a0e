//! Subscribers and the filter rules they own.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscriber identifier.
pub type SubscriberId = i64;
/// Filter identifier.
pub type FilterId = i64;
/// Condition identifier.
pub type ConditionId = i64;

/// Access token used to read a subscriber's feed.
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
    /// Wrap a raw access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for building request headers.
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}

/// An entity with its own filter rules, cursor and polling schedule.
#[derive(Debug, Clone)]
pub struct Subscriber {
    /// Unique identifier.
    pub id: SubscriberId,
    /// Notification address.
    pub email: String,
    /// GitHub account id.
    pub github_id: i64,
    /// GitHub login whose received-events feed is polled.
    pub github_login: String,
    /// Feed credentials, `None` until the subscriber has logged in.
    pub credentials: Option<Credentials>,
    /// Outcome when no filter matches: discard if true, accept otherwise.
    pub filter_default_discard: bool,
    /// Creation time of the newest event already processed.
    pub last_seen_created_at: DateTime<Utc>,
    /// Earliest time the next poll may happen.
    pub next_poll_at: DateTime<Utc>,
    /// Inactive subscribers are never polled.
    pub active: bool,
}

impl Subscriber {
    /// Create an active subscriber that is due immediately.
    pub fn new(id: SubscriberId, github_login: impl Into<String>) -> Self {
        Self {
            id,
            email: String::new(),
            github_id: 0,
            github_login: github_login.into(),
            credentials: None,
            filter_default_discard: false,
            last_seen_created_at: DateTime::<Utc>::UNIX_EPOCH,
            next_poll_at: DateTime::<Utc>::UNIX_EPOCH,
            active: true,
        }
    }

    /// Builder: set credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Builder: set the default-discard flag.
    pub fn with_default_discard(mut self, discard: bool) -> Self {
        self.filter_default_discard = discard;
        self
    }

    /// Builder: set the cursor.
    pub fn with_cursor(mut self, cursor: DateTime<Utc>) -> Self {
        self.last_seen_created_at = cursor;
        self
    }

    /// Whether the subscriber should be polled at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && self.next_poll_at <= now
    }
}

/// An ordered, AND-composed set of conditions plus an accept/discard action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Unique identifier; ascending ids follow creation order.
    pub id: FilterId,
    /// Owning subscriber.
    pub subscriber_id: SubscriberId,
    /// If true, a match discards the event instead of accepting it.
    pub on_match_discard: bool,
    /// Conditions, all of which must hold for the filter to match.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Filter {
    /// Create an accepting filter with no conditions.
    pub fn new(id: FilterId, subscriber_id: SubscriberId) -> Self {
        Self {
            id,
            subscriber_id,
            on_match_discard: false,
            conditions: Vec::new(),
        }
    }

    /// Builder: discard on match.
    pub fn discarding(mut self) -> Self {
        self.on_match_discard = true;
        self
    }

    /// Builder: append a condition.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// One atomic, optionally negated predicate over an event's fields.
///
/// Every field left empty (or zero, or `compare_public == false`) is ignored.
/// The predicate holds when all configured fields match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Condition {
    /// Unique identifier.
    pub id: ConditionId,
    /// Owning filter.
    pub filter_id: FilterId,
    /// Invert the predicate's result.
    pub negate: bool,
    /// Event type, exact match.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Payload action, exact match.
    pub payload_action: String,
    /// Label that must be applied to the issue.
    pub payload_issue_label: String,
    /// Milestone title, exact match.
    pub payload_issue_milestone_title: String,
    /// Regular expression matched against the issue title.
    pub payload_issue_title_regexp: String,
    /// Regular expression matched against the issue body.
    pub payload_issue_body_regexp: String,
    /// Compare the event's visibility with `public`.
    pub compare_public: bool,
    /// Expected visibility when `compare_public` is set.
    pub public: bool,
    /// Organization scope, zero for any.
    pub organization_id: i64,
    /// Repository scope, zero for any.
    pub repository_id: i64,
}

impl Condition {
    /// Condition on the event type.
    pub fn event_type(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    /// Builder: require a payload action.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.payload_action = action.into();
        self
    }

    /// Builder: require a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.payload_issue_label = label.into();
        self
    }

    /// Builder: require a milestone title.
    pub fn with_milestone(mut self, title: impl Into<String>) -> Self {
        self.payload_issue_milestone_title = title.into();
        self
    }

    /// Builder: require the title to match a pattern.
    pub fn with_title_regexp(mut self, pattern: impl Into<String>) -> Self {
        self.payload_issue_title_regexp = pattern.into();
        self
    }

    /// Builder: require the body to match a pattern.
    pub fn with_body_regexp(mut self, pattern: impl Into<String>) -> Self {
        self.payload_issue_body_regexp = pattern.into();
        self
    }

    /// Builder: require the given visibility.
    pub fn with_public(mut self, public: bool) -> Self {
        self.compare_public = true;
        self.public = public;
        self
    }

    /// Builder: restrict to an organization.
    pub fn with_organization(mut self, id: i64) -> Self {
        self.organization_id = id;
        self
    }

    /// Builder: restrict to a repository.
    pub fn with_repository(mut self, id: i64) -> Self {
        self.repository_id = id;
        self
    }

    /// Builder: invert the predicate.
    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.event_type.is_empty() {
            parts.push(format!("type is {}", self.event_type));
        }
        if !self.payload_action.is_empty() {
            parts.push(format!("action is {}", self.payload_action));
        }
        if !self.payload_issue_label.is_empty() {
            parts.push(format!("label is {}", self.payload_issue_label));
        }
        if !self.payload_issue_milestone_title.is_empty() {
            parts.push(format!("milestone is {}", self.payload_issue_milestone_title));
        }
        if !self.payload_issue_title_regexp.is_empty() {
            parts.push(format!("title matches {}", self.payload_issue_title_regexp));
        }
        if !self.payload_issue_body_regexp.is_empty() {
            parts.push(format!("body matches {}", self.payload_issue_body_regexp));
        }
        if self.compare_public {
            parts.push(if self.public { "is public" } else { "is private" }.to_string());
        }
        if self.organization_id != 0 {
            parts.push(format!("organization is {}", self.organization_id));
        }
        if self.repository_id != 0 {
            parts.push(format!("repository is {}", self.repository_id));
        }

        let body = if parts.is_empty() {
            "any event".to_string()
        } else {
            parts.join(" and ")
        };
        if self.negate {
            write!(f, "not ({})", body)
        } else {
            f.write_str(&body)
        }
    }
}
