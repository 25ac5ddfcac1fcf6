use serde::{Deserialize, Serialize};

use crate::path::Path;

/// One (path, value) pair as stored in pages and materialized results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub path: Path,
    pub value: f64,
}

impl Cell {
    pub fn new(path: Path, value: f64) -> Self {
        Self { path, value }
    }
}
