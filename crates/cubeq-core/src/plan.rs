//! Query plan trees.
//!
//! A plan is built outside the engine and handed to the exec crate, which
//! turns every node into a cell stream with a single exhaustive match.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::aggregation::{AggregationFunction, AggregationMap};
use crate::area::Area;
use crate::error::{Error, Result};
use crate::id::CubeId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlanNode {
    /// Raw cells of a registered cube, filtered by `area`.
    Source { cube: CubeId, area: Arc<Area> },
    /// The same value at every path of `area`.
    Constant { area: Arc<Area>, value: f64 },
    Aggregation {
        area: Arc<Area>,
        children: Vec<PlanNode>,
        #[serde(default)]
        function: AggregationFunction,
        /// One map per dimension, or `None` for identity.
        #[serde(default)]
        maps: Option<Arc<Vec<AggregationMap>>>,
        /// Result cap; 0 means unlimited.
        #[serde(default)]
        max_count: u64,
        /// Cube whose plan cache may hold this result.
        #[serde(default)]
        cache: Option<CubeId>,
    },
    Combination { area: Arc<Area>, children: Vec<PlanNode> },
    DisjunctiveCombination { area: Arc<Area>, children: Vec<PlanNode> },
}

impl PlanNode {
    pub fn source(cube: CubeId, area: Area) -> Self {
        PlanNode::Source { cube, area: Arc::new(area) }
    }

    pub fn constant(area: Area, value: f64) -> Self {
        PlanNode::Constant { area: Arc::new(area), value }
    }

    /// Plain SUM aggregation with identity maps and no cap.
    pub fn sum(area: Area, children: Vec<PlanNode>) -> Self {
        PlanNode::Aggregation {
            area: Arc::new(area),
            children,
            function: AggregationFunction::Sum,
            maps: None,
            max_count: 0,
            cache: None,
        }
    }

    pub fn combination(area: Area, children: Vec<PlanNode>) -> Self {
        PlanNode::Combination { area: Arc::new(area), children }
    }

    pub fn disjunctive(area: Area, children: Vec<PlanNode>) -> Self {
        PlanNode::DisjunctiveCombination { area: Arc::new(area), children }
    }

    pub fn area(&self) -> &Arc<Area> {
        use PlanNode::*;
        match self {
            Source { area, .. }
            | Constant { area, .. }
            | Aggregation { area, .. }
            | Combination { area, .. }
            | DisjunctiveCombination { area, .. } => area,
        }
    }

    pub fn children(&self) -> &[PlanNode] {
        use PlanNode::*;
        match self {
            Source { .. } | Constant { .. } => &[],
            Aggregation { children, .. }
            | Combination { children, .. }
            | DisjunctiveCombination { children, .. } => children,
        }
    }

    pub fn kind(&self) -> &'static str {
        use PlanNode::*;
        match self {
            Source { .. } => "source",
            Constant { .. } => "constant",
            Aggregation { .. } => "aggregation",
            Combination { .. } => "combination",
            DisjunctiveCombination { .. } => "disjunctive",
        }
    }

    /// Checks dimension agreement through the whole tree.
    pub fn validate(&self) -> Result<()> {
        let dims = self.area().dim_count();
        if let PlanNode::Aggregation { maps: Some(maps), .. } = self {
            if maps.len() != dims {
                return Err(Error::Plan(format!(
                    "aggregation has {} maps for {dims} dimensions",
                    maps.len()
                )));
            }
        }
        for child in self.children() {
            let child_dims = child.area().dim_count();
            if child_dims != dims {
                return Err(Error::Plan(format!(
                    "{} child has {child_dims} dimensions, parent {} has {dims}",
                    child.kind(),
                    self.kind()
                )));
            }
            child.validate()?;
        }
        Ok(())
    }
}
