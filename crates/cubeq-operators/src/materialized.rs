//! Stream over an already materialized, sorted cell list.
//!
//! Aggregation results and plan-cache hits are served through this type.

use std::sync::Arc;

use cubeq_core::cell::Cell;
use cubeq_core::error::{Error, Result};
use cubeq_core::path::{Path, EMPTY_PATH};

use crate::traits::CellStream;

pub struct CellVecStream {
    cells: Arc<[Cell]>,
    // None = before start; Some(len) = exhausted.
    pos: Option<usize>,
}

impl CellVecStream {
    /// `cells` must be strictly increasing by path.
    pub fn new(cells: impl Into<Arc<[Cell]>>) -> Self {
        Self {
            cells: cells.into(),
            pos: None,
        }
    }

    pub fn cells(&self) -> &Arc<[Cell]> {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn current(&self) -> Option<&Cell> {
        self.pos.and_then(|i| self.cells.get(i))
    }
}

impl CellStream for CellVecStream {
    fn next(&mut self) -> Result<bool> {
        let next = match self.pos {
            None => 0,
            Some(i) if i >= self.cells.len() => return Ok(false),
            Some(i) => i + 1,
        };
        self.pos = Some(next.min(self.cells.len()));
        Ok(next < self.cells.len())
    }

    fn key(&self) -> &Path {
        self.current().map_or(&EMPTY_PATH, |c| &c.path)
    }

    fn value(&self) -> Result<f64> {
        self.current()
            .map(|c| c.value)
            .ok_or_else(|| Error::Internal("materialized stream read while unpositioned".into()))
    }

    fn reset(&mut self) {
        self.pos = None;
    }

    fn seek(&mut self, target: &Path) -> Result<bool> {
        let from = match self.pos {
            Some(i) if i >= self.cells.len() => return Ok(false),
            Some(i) if self.cells[i].path >= *target => return Ok(true),
            Some(i) => i + 1,
            None => 0,
        };
        let idx = from + self.cells[from..].partition_point(|c| c.path < *target);
        self.pos = Some(idx);
        Ok(idx < self.cells.len())
    }
}
