//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Thread-pool size. 1 keeps every aggregation on the calling thread.
    pub worker_threads: usize,

    /// Target areas smaller than this use the dense hashed accumulator.
    pub hash_threshold: u64,

    /// Minimum split distance as a multiple of the storage's page row count.
    pub split_page_multiple: u64,

    /// Smallest target area for which the engine picks parallel aggregation.
    pub parallel_threshold: u64,

    /// Cap applied to aggregations whose node leaves `max_count` at 0.
    pub max_result_count: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            worker_threads: cores.min(8),
            hash_threshold: 1000,
            split_page_multiple: 20,
            parallel_threshold: 1000,
            max_result_count: 0,
        }
    }
}

impl EngineConfig {
    /// Single-threaded configuration, handy in tests.
    pub fn sequential() -> Self {
        Self {
            worker_threads: 1,
            ..Self::default()
        }
    }

    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `CUBEQ_WORKER_THREADS`: thread-pool size
    /// - `CUBEQ_HASH_THRESHOLD`: dense accumulator threshold (cells)
    /// - `CUBEQ_SPLIT_PAGE_MULTIPLE`: split granularity in pages
    /// - `CUBEQ_PARALLEL_THRESHOLD`: minimum area size for parallel aggregation
    /// - `CUBEQ_MAX_RESULT_COUNT`: default aggregation cap
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_parse::<usize>("CUBEQ_WORKER_THREADS") {
            cfg.worker_threads = v;
        }
        if let Some(v) = env_parse::<u64>("CUBEQ_HASH_THRESHOLD") {
            cfg.hash_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("CUBEQ_SPLIT_PAGE_MULTIPLE") {
            cfg.split_page_multiple = v;
        }
        if let Some(v) = env_parse::<u64>("CUBEQ_PARALLEL_THRESHOLD") {
            cfg.parallel_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("CUBEQ_MAX_RESULT_COUNT") {
            cfg.max_result_count = v;
        }

        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::Config("worker_threads must be at least 1".into()));
        }
        Ok(())
    }

    pub fn is_parallel(&self) -> bool {
        self.worker_threads > 1
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}
