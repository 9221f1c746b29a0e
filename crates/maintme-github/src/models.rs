//! Wire format of the GitHub events API.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use maintme_core::{Event, IssuePayload};

/// One element of an events API response.
#[derive(Debug, Clone, Deserialize)]
pub struct WireEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub actor: WireAccount,
    pub repo: WireRepo,
    #[serde(default)]
    pub org: Option<WireAccount>,
    #[serde(default)]
    pub payload: WirePayload,
    #[serde(default = "default_public")]
    pub public: bool,
    pub created_at: DateTime<Utc>,
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireAccount {
    pub id: i64,
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireRepo {
    pub id: i64,
    pub name: String,
}

/// The payload fields the rules look at. Everything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WirePayload {
    pub action: Option<String>,
    pub issue: Option<WireIssue>,
    pub pull_request: Option<WireIssue>,
}

/// Shared shape of issues and pull requests.
#[derive(Debug, Clone, Deserialize)]
pub struct WireIssue {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<WireLabel>,
    #[serde(default)]
    pub milestone: Option<WireMilestone>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireLabel {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMilestone {
    pub title: String,
}

impl From<WireIssue> for IssuePayload {
    fn from(issue: WireIssue) -> Self {
        Self {
            number: issue.number,
            title: issue.title,
            body: issue.body.unwrap_or_default(),
            labels: issue.labels.into_iter().map(|l| l.name).collect(),
            milestone: issue.milestone.map(|m| m.title),
            html_url: issue.html_url,
        }
    }
}

impl From<WireEvent> for Event {
    fn from(wire: WireEvent) -> Self {
        // comments on pull requests carry both; the issue side has the labels
        let issue = wire.payload.issue.or(wire.payload.pull_request);

        Self {
            id: wire.id,
            event_type: wire.event_type,
            action: wire.payload.action,
            issue: issue.map(IssuePayload::from),
            public: wire.public,
            organization_id: wire.org.map(|o| o.id),
            repository_id: wire.repo.id,
            repository_name: wire.repo.name,
            actor: wire.actor.login,
            created_at: wire.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ISSUES_EVENT: &str = r#"{
        "id": "6374857191",
        "type": "IssuesEvent",
        "actor": {"id": 1, "login": "octocat", "url": "https://api.github.com/users/octocat"},
        "repo": {"id": 1296269, "name": "octocat/Hello-World"},
        "org": {"id": 9919, "login": "github"},
        "payload": {
            "action": "opened",
            "issue": {
                "number": 1347,
                "title": "Found a bug",
                "body": null,
                "labels": [{"id": 208045946, "name": "bug"}],
                "milestone": {"title": "v1.0"},
                "html_url": "https://github.com/octocat/Hello-World/issues/1347"
            }
        },
        "public": true,
        "created_at": "2017-07-03T12:00:00Z"
    }"#;

    #[test]
    fn test_issues_event() {
        let wire: WireEvent = serde_json::from_str(ISSUES_EVENT).unwrap();
        let event = Event::from(wire);

        assert_eq!(event.id, "6374857191");
        assert_eq!(event.event_type, "IssuesEvent");
        assert_eq!(event.action.as_deref(), Some("opened"));
        assert_eq!(event.organization_id, Some(9919));
        assert_eq!(event.repository_id, 1296269);
        assert_eq!(event.repository_name, "octocat/Hello-World");
        assert_eq!(event.actor, "octocat");
        assert_eq!(
            event.created_at,
            Utc.with_ymd_and_hms(2017, 7, 3, 12, 0, 0).unwrap()
        );

        let issue = event.issue.unwrap();
        assert_eq!(issue.number, 1347);
        assert_eq!(issue.body, "");
        assert_eq!(issue.labels, vec!["bug"]);
        assert_eq!(issue.milestone.as_deref(), Some("v1.0"));
    }

    #[test]
    fn test_pull_request_maps_to_issue_payload() {
        let json = r#"{
            "id": "2",
            "type": "PullRequestEvent",
            "actor": {"id": 1, "login": "octocat"},
            "repo": {"id": 5, "name": "octocat/repo"},
            "payload": {
                "action": "closed",
                "number": 7,
                "pull_request": {"number": 7, "title": "Fix it", "body": "Closes #6", "labels": []}
            },
            "created_at": "2017-07-03T12:00:00Z"
        }"#;
        let event = Event::from(serde_json::from_str::<WireEvent>(json).unwrap());

        assert!(event.public);
        assert_eq!(event.organization_id, None);
        let issue = event.issue.unwrap();
        assert_eq!(issue.title, "Fix it");
        assert_eq!(issue.body, "Closes #6");
    }

    #[test]
    fn test_event_without_issue() {
        let json = r#"{
            "id": "3",
            "type": "PushEvent",
            "actor": {"id": 1, "login": "octocat"},
            "repo": {"id": 5, "name": "octocat/repo"},
            "payload": {"push_id": 1, "size": 1, "commits": []},
            "public": false,
            "created_at": "2017-07-03T12:00:00Z"
        }"#;
        let event = Event::from(serde_json::from_str::<WireEvent>(json).unwrap());

        assert!(!event.public);
        assert!(event.action.is_none());
        assert!(event.issue.is_none());
    }
}
