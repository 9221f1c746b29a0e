//! Activity events received from the feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Issue-like payload carried by issue and pull request events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePayload {
    /// Issue or pull request number.
    pub number: u64,
    /// Title.
    pub title: String,
    /// Body text (empty when the author left it blank).
    #[serde(default)]
    pub body: String,
    /// Names of the labels applied.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Title of the milestone, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<String>,
    /// Browser URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

impl IssuePayload {
    /// Create a payload with a number and title.
    pub fn new(number: u64, title: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            ..Default::default()
        }
    }

    /// Builder: set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Builder: add a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Builder: set the milestone title.
    pub fn with_milestone(mut self, title: impl Into<String>) -> Self {
        self.milestone = Some(title.into());
        self
    }
}

/// An immutable record from the activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Feed-assigned unique identifier.
    pub id: String,
    /// Event type, e.g. `IssuesEvent`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Payload action, e.g. `opened`. Not every event type has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Issue or pull request the event refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<IssuePayload>,
    /// Whether the event is publicly visible.
    pub public: bool,
    /// Organization the repository belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<i64>,
    /// Repository identifier.
    pub repository_id: i64,
    /// Repository full name, `owner/name`.
    #[serde(default)]
    pub repository_name: String,
    /// Login of the actor who triggered the event.
    #[serde(default)]
    pub actor: String,
    /// When the feed recorded the event.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Create an event with the required fields; everything else is empty.
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            action: None,
            issue: None,
            public: true,
            organization_id: None,
            repository_id: 0,
            repository_name: String::new(),
            actor: String::new(),
            created_at,
        }
    }

    /// Builder: set the payload action.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Builder: set the issue payload.
    pub fn with_issue(mut self, issue: IssuePayload) -> Self {
        self.issue = Some(issue);
        self
    }

    /// Builder: set visibility.
    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// Builder: set the owning organization.
    pub fn with_organization(mut self, id: i64) -> Self {
        self.organization_id = Some(id);
        self
    }

    /// Builder: set the repository.
    pub fn with_repository(mut self, id: i64, name: impl Into<String>) -> Self {
        self.repository_id = id;
        self.repository_name = name.into();
        self
    }

    /// Builder: set the actor login.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Short one-line summary, e.g. `IssuesEvent opened owner/repo#12`.
    pub fn summary(&self) -> String {
        let mut out = self.event_type.clone();
        if let Some(action) = &self.action {
            out.push(' ');
            out.push_str(action);
        }
        if !self.repository_name.is_empty() {
            out.push(' ');
            out.push_str(&self.repository_name);
        }
        if let Some(issue) = &self.issue {
            out.push_str(&format!("#{} {}", issue.number, issue.title));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_summary() {
        let at = Utc.with_ymd_and_hms(2017, 7, 3, 12, 0, 0).unwrap();
        let event = Event::new("1", "IssuesEvent", at)
            .with_action("opened")
            .with_repository(42, "octo/repo")
            .with_issue(IssuePayload::new(12, "Crash on start"));

        assert_eq!(event.summary(), "IssuesEvent opened octo/repo#12 Crash on start");
    }

    #[test]
    fn test_serde_uses_type_key() {
        let at = Utc.with_ymd_and_hms(2017, 7, 3, 12, 0, 0).unwrap();
        let event = Event::new("1", "PushEvent", at);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PushEvent");
        assert!(json.get("action").is_none());
    }
}
