//! Filter rule evaluation.
//!
//! The evaluation policy is fixed and deliberately small:
//!
//! 1. A [`Condition`](crate::types::Condition) holds when every configured
//!    field matches the event. Its `negate` flag inverts that raw result.
//! 2. A [`Filter`](crate::types::Filter) matches when all of its conditions
//!    hold (logical AND, evaluated in order, stopping at the first false).
//!    A filter without conditions matches every event.
//! 3. A subscriber's filters are scanned in creation order. The first
//!    matching filter decides: discard if its `on_match_discard` flag is
//!    set, accept otherwise. When no filter matches, the subscriber's
//!    `filter_default_discard` flag decides.
//!
//! Rules are compiled once per poll cycle with [`RuleSet::compile`]. A filter
//! containing a condition that fails to compile is kept as malformed and
//! never matches, so events fall through to later filters and the default.

mod condition;
mod filter;
mod policy;

pub use condition::CompiledCondition;
pub use filter::CompiledFilter;
pub use policy::{Decision, DecisionReason, RuleSet, Verdict};
