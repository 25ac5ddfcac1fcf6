//! Storage abstraction for paged raw cells.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use cubeq_core::cell::Cell;
use cubeq_core::error::Result;
use cubeq_core::path::Path;

/// A page of raw cells, sorted by path. Paths may repeat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Page {
    cells: Vec<Cell>,
}

impl Page {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn first_path(&self) -> Option<&Path> {
        self.cells.first().map(|c| &c.path)
    }

    pub fn last_path(&self) -> Option<&Path> {
        self.cells.last().map(|c| &c.path)
    }
}

/// Read side of a cube's raw cell storage.
///
/// Invariants expected by scans:
/// - pages are globally sorted by path (page `i` never holds a path greater
///   than the first path of page `i + 1`);
/// - `page_row_offset(page_count())` equals the total row count.
pub trait CellStorage: Send + Sync {
    fn dim_count(&self) -> usize;

    fn page_count(&self) -> usize;

    /// Largest number of rows any page holds.
    fn max_page_rows(&self) -> usize;

    fn page(&self, index: usize) -> Result<Arc<Page>>;

    /// Rows stored before page `index`.
    fn page_row_offset(&self, index: usize) -> u64;

    fn page_first_key(&self, index: usize) -> Result<Path>;

    fn row_count(&self) -> u64 {
        self.page_row_offset(self.page_count())
    }
}
