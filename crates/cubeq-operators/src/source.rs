//! Raw cube cells as a [`CellStream`].

use cubeq_core::cell::Cell;
use cubeq_core::error::{Error, Result};
use cubeq_core::path::{Path, EMPTY_PATH};
use cubeq_storage::PageScan;

use crate::traits::CellStream;

/// Wraps a [`PageScan`] and folds consecutive rows with the same path into
/// one summed cell, so the output is strictly increasing.
pub struct SourceStream {
    scan: PageScan,
    current: Option<Cell>,
    // The scan already sits on the first row of the next group.
    pending: bool,
    done: bool,
}

impl SourceStream {
    pub fn new(scan: PageScan) -> Self {
        Self {
            scan,
            current: None,
            pending: false,
            done: false,
        }
    }
}

impl CellStream for SourceStream {
    fn next(&mut self) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        if !self.pending && !self.scan.next()? {
            self.current = None;
            self.done = true;
            return Ok(false);
        }

        let path = self.scan.key().clone();
        let mut value = self.scan.value()?;
        self.pending = false;
        while self.scan.next()? {
            if self.scan.key() != &path {
                self.pending = true;
                break;
            }
            value += self.scan.value()?;
        }
        self.current = Some(Cell::new(path, value));
        Ok(true)
    }

    fn key(&self) -> &Path {
        self.current.as_ref().map_or(&EMPTY_PATH, |c| &c.path)
    }

    fn value(&self) -> Result<f64> {
        self.current
            .as_ref()
            .map(|c| c.value)
            .ok_or_else(|| Error::Internal("source stream read while unpositioned".into()))
    }

    fn reset(&mut self) {
        self.scan.reset();
        self.current = None;
        self.pending = false;
        self.done = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::drain;
    use cubeq_core::area::Area;
    use cubeq_core::path;
    use cubeq_storage::{CellStorage, MemoryStorage};
    use std::sync::Arc;

    #[test]
    fn folds_duplicate_rows() {
        let storage: Arc<dyn CellStorage> = Arc::new(
            MemoryStorage::from_rows(
                2,
                1,
                &[(&[1, 1], 2.0), (&[1, 1], 3.0), (&[2, 1], 4.0), (&[2, 2], 1.0)],
            )
            .unwrap(),
        );
        let area = Arc::new(Area::from_ids(vec![vec![1, 2], vec![1]]).unwrap());
        let mut s = SourceStream::new(PageScan::new(storage, area));
        let cells = drain(&mut s).unwrap();
        assert_eq!(
            cells,
            vec![Cell::new(path![1, 1], 5.0), Cell::new(path![2, 1], 4.0)]
        );
        assert!(!s.next().unwrap());

        s.reset();
        assert_eq!(drain(&mut s).unwrap(), cells);
    }
}
