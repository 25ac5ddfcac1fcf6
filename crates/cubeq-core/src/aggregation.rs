//! Aggregation functions and per-dimension consolidation maps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::id::Identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AggregationFunction {
    #[default]
    Sum,
    Avg,
    Count,
    Max,
    Min,
}

impl AggregationFunction {
    /// Only plain sums are order-independent enough to split across workers.
    pub fn is_parallel_safe(self) -> bool {
        matches!(self, AggregationFunction::Sum)
    }
}

/// Weighted parent target of one source element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: Identifier,
    pub weight: f64,
}

/// Source element -> weighted parent elements, for one dimension.
///
/// Elements with no entry consolidate onto themselves with weight 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationMap {
    targets: BTreeMap<Identifier, Vec<Target>>,
}

impl AggregationMap {
    pub fn identity() -> Self {
        Self::default()
    }

    /// Adds `parent` as a target of `source`.
    pub fn insert(&mut self, source: Identifier, parent: Identifier, weight: f64) -> &mut Self {
        self.targets.entry(source).or_default().push(Target { id: parent, weight });
        self
    }

    pub fn with(mut self, source: u32, parent: u32, weight: f64) -> Self {
        self.insert(Identifier::new(source), Identifier::new(parent), weight);
        self
    }

    /// Mapped targets of `source`, or `None` when it maps onto itself.
    pub fn targets(&self, source: Identifier) -> Option<&[Target]> {
        self.targets.get(&source).map(Vec::as_slice)
    }

    pub fn is_identity(&self) -> bool {
        self.targets.is_empty()
    }
}
