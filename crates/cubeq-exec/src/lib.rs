#![forbid(unsafe_code)]
//! cubeq-exec: engine, thread pool, parallel aggregation, and plan cache.
//!
//! The engine turns a plan tree into a cell stream. Everything runs on the
//! calling thread except SUM aggregations over raw storage with large
//! targets, which split their scans across the pool at page boundaries.

pub mod cache;
pub mod metrics;
pub mod parallel;
pub mod pool;
pub mod runtime;

pub use cache::{CacheKey, MemoryPlanCache, PlanCache};
pub use metrics::AggregationStats;
pub use parallel::ParallelAggregation;
pub use pool::{PoolHandle, ThreadGroup, ThreadPool};
pub use runtime::Engine;
