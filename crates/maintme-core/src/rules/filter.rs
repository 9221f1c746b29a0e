//! Filter evaluation: AND over conditions.

use crate::error::MaintmeResult;
use crate::rules::CompiledCondition;
use crate::types::{Event, Filter, FilterId};

/// A filter with all of its conditions compiled.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    id: FilterId,
    on_match_discard: bool,
    conditions: Vec<CompiledCondition>,
}

impl Filter {
    /// Compile every condition of the filter.
    ///
    /// Fails on the first malformed condition.
    pub fn compile(&self) -> MaintmeResult<CompiledFilter> {
        let conditions = self
            .conditions
            .iter()
            .map(|c| c.compile())
            .collect::<MaintmeResult<Vec<_>>>()?;

        Ok(CompiledFilter {
            id: self.id,
            on_match_discard: self.on_match_discard,
            conditions,
        })
    }
}

impl CompiledFilter {
    /// Identifier of the source filter.
    pub fn id(&self) -> FilterId {
        self.id
    }

    /// Whether a match discards the event.
    pub fn on_match_discard(&self) -> bool {
        self.on_match_discard
    }

    /// Number of conditions.
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// True when the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether every condition holds for the event.
    ///
    /// A filter with zero conditions matches every event, which lets a bare
    /// accept or discard rule apply unconditionally.
    pub fn matches(&self, event: &Event) -> bool {
        self.conditions.iter().all(|c| c.matches(event))
    }
}
