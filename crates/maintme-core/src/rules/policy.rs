//! First-match decision policy over a subscriber's filters.

use strum::{Display, EnumString};
use tracing::warn;

use crate::rules::CompiledFilter;
use crate::types::{Event, Filter, FilterId};

/// Outcome of evaluating an event against a subscriber's rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Decision {
    /// Deliver the event.
    Accept,
    /// Drop the event.
    Discard,
}

impl Decision {
    fn from_discard(discard: bool) -> Self {
        if discard {
            Self::Discard
        } else {
            Self::Accept
        }
    }
}

/// What produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    /// The given filter was the first to match.
    Filter(FilterId),
    /// No filter matched; the subscriber default applied.
    Default,
}

/// A decision together with its reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub reason: DecisionReason,
}

#[derive(Debug, Clone)]
enum Rule {
    Compiled(CompiledFilter),
    Malformed(FilterId),
}

/// A subscriber's filters, compiled and kept in creation order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile filters, preserving their order.
    ///
    /// Filters that fail to compile are logged and kept as never-matching
    /// placeholders.
    pub fn compile(filters: &[Filter]) -> Self {
        let rules = filters
            .iter()
            .map(|filter| match filter.compile() {
                Ok(compiled) => Rule::Compiled(compiled),
                Err(e) => {
                    warn!(
                        filter_id = filter.id,
                        subscriber_id = filter.subscriber_id,
                        error = %e,
                        "Skipping malformed filter"
                    );
                    Rule::Malformed(filter.id)
                }
            })
            .collect();

        Self { rules }
    }

    /// Number of filters, including malformed ones.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when there are no filters.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Ids of filters that failed to compile.
    pub fn malformed(&self) -> Vec<FilterId> {
        self.rules
            .iter()
            .filter_map(|r| match r {
                Rule::Malformed(id) => Some(*id),
                Rule::Compiled(_) => None,
            })
            .collect()
    }

    /// Decide an event. See the module documentation for the policy.
    pub fn decide(&self, event: &Event, default_discard: bool) -> Verdict {
        let first_match = self.rules.iter().find_map(|rule| match rule {
            Rule::Compiled(filter) if filter.matches(event) => Some(filter),
            _ => None,
        });

        match first_match {
            Some(filter) => Verdict {
                decision: Decision::from_discard(filter.on_match_discard()),
                reason: DecisionReason::Filter(filter.id()),
            },
            None => Verdict {
                decision: Decision::from_discard(default_discard),
                reason: DecisionReason::Default,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Condition;
    use chrono::Utc;

    fn event(action: &str) -> Event {
        Event::new("1", "IssuesEvent", Utc::now()).with_action(action)
    }

    fn opened_filter(id: FilterId) -> Filter {
        Filter::new(id, 1).with_condition(Condition::event_type("IssuesEvent").with_action("opened"))
    }

    #[test]
    fn test_default_applies_when_nothing_matches() {
        let rules = RuleSet::compile(&[opened_filter(1)]);

        let verdict = rules.decide(&event("closed"), true);
        assert_eq!(verdict.decision, Decision::Discard);
        assert_eq!(verdict.reason, DecisionReason::Default);

        let verdict = rules.decide(&event("closed"), false);
        assert_eq!(verdict.decision, Decision::Accept);
    }

    #[test]
    fn test_no_filters_uses_default() {
        let rules = RuleSet::compile(&[]);
        assert!(rules.is_empty());
        assert_eq!(rules.decide(&event("opened"), true).decision, Decision::Discard);
        assert_eq!(rules.decide(&event("opened"), false).decision, Decision::Accept);
    }

    #[test]
    fn test_matching_filter_action() {
        let accept = RuleSet::compile(&[opened_filter(1)]);
        assert_eq!(accept.decide(&event("opened"), true).decision, Decision::Accept);

        let discard = RuleSet::compile(&[opened_filter(1).discarding()]);
        assert_eq!(discard.decide(&event("opened"), false).decision, Decision::Discard);
    }

    #[test]
    fn test_first_match_wins() {
        let accept_all = Filter::new(1, 1);
        let discard_all = Filter::new(2, 1).discarding();

        let rules = RuleSet::compile(&[accept_all.clone(), discard_all.clone()]);
        let verdict = rules.decide(&event("opened"), true);
        assert_eq!(verdict.decision, Decision::Accept);
        assert_eq!(verdict.reason, DecisionReason::Filter(1));

        let reversed = RuleSet::compile(&[discard_all, accept_all]);
        let verdict = reversed.decide(&event("opened"), false);
        assert_eq!(verdict.decision, Decision::Discard);
        assert_eq!(verdict.reason, DecisionReason::Filter(2));
    }

    #[test]
    fn test_malformed_filter_falls_through() {
        let broken = Filter::new(1, 1)
            .with_condition(Condition::default().with_title_regexp("(oops").negated());
        let discard_closed =
            Filter::new(2, 1).discarding().with_condition(Condition::default().with_action("closed"));

        let rules = RuleSet::compile(&[broken, discard_closed]);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.malformed(), vec![1]);

        // negation does not turn a malformed condition into a match
        let verdict = rules.decide(&event("opened"), true);
        assert_eq!(verdict.reason, DecisionReason::Default);
        assert_eq!(verdict.decision, Decision::Discard);

        let verdict = rules.decide(&event("closed"), false);
        assert_eq!(verdict.reason, DecisionReason::Filter(2));
        assert_eq!(verdict.decision, Decision::Discard);
    }

    #[test]
    fn test_decision_display() {
        assert_eq!(Decision::Accept.to_string(), "accept");
        assert_eq!("discard".parse::<Decision>().unwrap(), Decision::Discard);
    }
}
