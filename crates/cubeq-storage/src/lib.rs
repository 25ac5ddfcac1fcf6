#![forbid(unsafe_code)]
//! cubeq-storage: the raw-storage boundary consumed by the engine.
//!
//! Design intent:
//! - Page persistence is somebody else's problem; the engine only needs
//!   sorted pages, their first keys, and cumulative row offsets.
//! - [`scan::PageScan`] is the pull cursor aggregation runs on. It exposes
//!   an explicit page-entry yield point and can hand off the tail of its
//!   range to another worker.

pub mod memory_storage;
pub mod registry;
pub mod scan;
pub mod storage;

pub use memory_storage::MemoryStorage;
pub use registry::CubeRegistry;
pub use scan::PageScan;
pub use storage::{CellStorage, Page};
