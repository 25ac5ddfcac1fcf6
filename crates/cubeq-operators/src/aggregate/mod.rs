//! Aggregation: accumulators, contribution expansion, and the sequential
//! operator. The parallel operator lives in `cubeq-exec` and reuses
//! [`AggregationTarget`] and [`AggregationState`] on worker threads.

pub mod cell_map;
pub mod processor;
pub mod target;

pub use cell_map::{CellMap, HashedCells, OrderedCells};
pub use processor::{AggregationInput, AggregationProcessor};
pub use target::{AggregationState, AggregationTarget, ParentExpander};
