//! In-memory paged storage.
//!
//! Rows are sorted once at construction and chunked into fixed-size pages.
//! Used by tests, benchmarks, and callers that already hold cells in memory.

use std::sync::Arc;

use cubeq_core::cell::Cell;
use cubeq_core::error::{Error, Result};
use cubeq_core::path::Path;

use crate::storage::{CellStorage, Page};

#[derive(Debug, Clone)]
pub struct MemoryStorage {
    dim_count: usize,
    page_rows: usize,
    pages: Vec<Arc<Page>>,
    // offsets[i] = rows before page i; one extra trailing entry.
    offsets: Vec<u64>,
}

impl MemoryStorage {
    pub fn new(
        dim_count: usize,
        page_rows: usize,
        cells: impl IntoIterator<Item = Cell>,
    ) -> Result<Self> {
        if page_rows == 0 {
            return Err(Error::Config("page_rows must be at least 1".into()));
        }
        let mut cells: Vec<Cell> = cells.into_iter().collect();
        if let Some(bad) = cells.iter().find(|c| c.path.dim_count() != dim_count) {
            return Err(Error::Storage(format!(
                "cell {} has {} dimensions, storage has {dim_count}",
                bad.path,
                bad.path.dim_count()
            )));
        }
        // Stable: duplicate paths keep their insertion order.
        cells.sort_by(|a, b| a.path.cmp(&b.path));

        let mut pages = Vec::with_capacity(cells.len().div_ceil(page_rows));
        let mut offsets = vec![0u64];
        let mut rest = cells.into_iter().peekable();
        while rest.peek().is_some() {
            let chunk: Vec<Cell> = rest.by_ref().take(page_rows).collect();
            let before = offsets[offsets.len() - 1];
            offsets.push(before + chunk.len() as u64);
            pages.push(Arc::new(Page::new(chunk)));
        }

        Ok(Self {
            dim_count,
            page_rows,
            pages,
            offsets,
        })
    }

    /// Convenience constructor from raw `(ids, value)` pairs.
    pub fn from_rows(dim_count: usize, page_rows: usize, rows: &[(&[u32], f64)]) -> Result<Self> {
        Self::new(
            dim_count,
            page_rows,
            rows.iter()
                .map(|(ids, value)| Cell::new(Path::from_raw(ids), *value)),
        )
    }

    pub fn page_rows(&self) -> usize {
        self.page_rows
    }
}

impl CellStorage for MemoryStorage {
    fn dim_count(&self) -> usize {
        self.dim_count
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn max_page_rows(&self) -> usize {
        self.page_rows
    }

    fn page(&self, index: usize) -> Result<Arc<Page>> {
        self.pages
            .get(index)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("page {index} out of range")))
    }

    fn page_row_offset(&self, index: usize) -> u64 {
        let last = self.offsets.len() - 1;
        self.offsets[index.min(last)]
    }

    fn page_first_key(&self, index: usize) -> Result<Path> {
        self.page(index)?
            .first_path()
            .cloned()
            .ok_or_else(|| Error::Storage(format!("page {index} is empty")))
    }
}
