//! Convenient re-exports for downstream crates.

pub use crate::aggregation::{AggregationFunction, AggregationMap};
pub use crate::area::Area;
pub use crate::cell::Cell;
pub use crate::config::EngineConfig;
pub use crate::error::{Error, Result};
pub use crate::id::{CubeId, Identifier};
pub use crate::path::{Path, EMPTY_PATH};
pub use crate::plan::PlanNode;
pub use crate::translator::{BinPath, PathTranslator};
