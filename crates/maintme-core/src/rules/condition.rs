//! Single condition evaluation.

use regex::Regex;

use crate::error::{MaintmeError, MaintmeResult};
use crate::types::{Condition, ConditionId, Event};

/// A condition with its patterns compiled.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    condition: Condition,
    title: Option<Regex>,
    body: Option<Regex>,
}

impl Condition {
    /// Compile the condition's regular expressions.
    ///
    /// Fails with `MaintmeError::MalformedRule` when a pattern is invalid.
    pub fn compile(&self) -> MaintmeResult<CompiledCondition> {
        Ok(CompiledCondition {
            title: compile_pattern(self, &self.payload_issue_title_regexp)?,
            body: compile_pattern(self, &self.payload_issue_body_regexp)?,
            condition: self.clone(),
        })
    }
}

fn compile_pattern(condition: &Condition, pattern: &str) -> MaintmeResult<Option<Regex>> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(pattern).map(Some).map_err(|e| {
        MaintmeError::malformed_rule(
            condition.filter_id,
            Some(condition.id),
            format!("invalid pattern {:?}: {}", pattern, e),
        )
    })
}

impl CompiledCondition {
    /// Identifier of the source condition.
    pub fn id(&self) -> ConditionId {
        self.condition.id
    }

    /// The source condition.
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Evaluate against an event, applying `negate`.
    pub fn matches(&self, event: &Event) -> bool {
        self.raw_matches(event) != self.condition.negate
    }

    /// Evaluate against an event, ignoring `negate`.
    pub fn raw_matches(&self, event: &Event) -> bool {
        let c = &self.condition;

        if !equals_or_empty(&c.event_type, Some(event.event_type.as_str())) {
            return false;
        }
        if !equals_or_empty(&c.payload_action, event.action.as_deref()) {
            return false;
        }
        if c.compare_public && event.public != c.public {
            return false;
        }
        if c.organization_id != 0 && event.organization_id != Some(c.organization_id) {
            return false;
        }
        if c.repository_id != 0 && event.repository_id != c.repository_id {
            return false;
        }

        let issue = event.issue.as_ref();
        if !c.payload_issue_label.is_empty()
            && !issue.is_some_and(|i| i.labels.iter().any(|l| *l == c.payload_issue_label))
        {
            return false;
        }
        if !equals_or_empty(
            &c.payload_issue_milestone_title,
            issue.and_then(|i| i.milestone.as_deref()),
        ) {
            return false;
        }
        if let Some(re) = &self.title {
            if !issue.is_some_and(|i| re.is_match(&i.title)) {
                return false;
            }
        }
        if let Some(re) = &self.body {
            if !issue.is_some_and(|i| re.is_match(&i.body)) {
                return false;
            }
        }

        true
    }
}

/// Exact equality, where an empty expected value means "don't care".
fn equals_or_empty(expected: &str, actual: Option<&str>) -> bool {
    expected.is_empty() || actual == Some(expected)
}
