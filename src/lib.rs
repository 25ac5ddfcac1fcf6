#![forbid(unsafe_code)]
//! cubeq: streaming cell-level query evaluation over multidimensional cubes.
//!
//! This crate only re-exports the workspace members:
//! - [`cubeq_core`]: paths, areas, plans, config, errors
//! - [`cubeq_storage`]: paged cell storage and scans
//! - [`cubeq_operators`]: pull-based cell streams
//! - [`cubeq_exec`]: engine, thread pool, parallel aggregation, plan cache

pub use cubeq_core;
pub use cubeq_exec;
pub use cubeq_operators;
pub use cubeq_storage;

pub use cubeq_core::path;
pub use cubeq_core::prelude::*;
pub use cubeq_exec::{Engine, MemoryPlanCache, PlanCache};
pub use cubeq_operators::{drain, CellStream};
pub use cubeq_storage::{CellStorage, MemoryStorage};
