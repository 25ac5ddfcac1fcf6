//! Pull-style cursor over a page range of a [`CellStorage`].
//!
//! The scan yields raw rows whose path lies inside its selection area, in
//! storage order (duplicates included). After every `next()` the caller may
//! check [`PageScan::take_page_entered`]: it reports, once, that the cursor
//! has just moved onto a new page. That is the point at which a parallel
//! aggregation decides whether to hand the tail of the range to another job.

use std::sync::Arc;

use cubeq_core::area::Area;
use cubeq_core::error::{Error, Result};
use cubeq_core::path::{Path, EMPTY_PATH};

use crate::storage::{CellStorage, Page};

pub struct PageScan {
    storage: Arc<dyn CellStorage>,
    area: Arc<Area>,
    lower: Option<Path>,
    upper: Option<Path>,
    start: usize,
    pos: usize,
    end: usize,
    page: Option<Arc<Page>>,
    row: usize,
    positioned: bool,
    entered: bool,
    rows_read: u64,
}

impl PageScan {
    /// Scan over every page of `storage`.
    pub fn new(storage: Arc<dyn CellStorage>, area: Arc<Area>) -> Self {
        let end = storage.page_count();
        Self::with_range(storage, area, 0, end)
    }

    pub fn with_range(
        storage: Arc<dyn CellStorage>,
        area: Arc<Area>,
        start: usize,
        end: usize,
    ) -> Self {
        let end = end.min(storage.page_count());
        Self {
            lower: area.first_path(),
            upper: area.last_path(),
            storage,
            area,
            start,
            pos: start,
            end,
            page: None,
            row: 0,
            positioned: false,
            entered: false,
            rows_read: 0,
        }
    }

    pub fn storage(&self) -> &Arc<dyn CellStorage> {
        &self.storage
    }

    pub fn area(&self) -> &Arc<Area> {
        &self.area
    }

    /// Advance to the next selected row. Storage errors are returned as-is.
    pub fn next(&mut self) -> Result<bool> {
        let (Some(lower), Some(upper)) = (self.lower.as_ref(), self.upper.as_ref()) else {
            self.finish();
            return Ok(false);
        };

        if self.positioned {
            self.row += 1;
        }
        loop {
            let page = match &self.page {
                Some(page) => Arc::clone(page),
                None => {
                    if self.pos >= self.end {
                        self.finish();
                        return Ok(false);
                    }
                    let page = self.storage.page(self.pos)?;
                    match (page.first_path(), page.last_path()) {
                        (Some(first), _) if first > upper => {
                            // Pages are sorted; nothing further can match.
                            self.pos = self.end;
                            continue;
                        }
                        (Some(_), Some(last)) if last >= lower => {}
                        _ => {
                            self.pos += 1;
                            continue;
                        }
                    }
                    self.entered = true;
                    self.row = 0;
                    self.page = Some(Arc::clone(&page));
                    page
                }
            };

            let cells = page.cells();
            while self.row < cells.len() {
                if self.area.contains(&cells[self.row].path) {
                    self.positioned = true;
                    self.rows_read += 1;
                    return Ok(true);
                }
                self.row += 1;
            }
            self.page = None;
            self.pos += 1;
        }
    }

    fn finish(&mut self) {
        self.page = None;
        self.positioned = false;
        self.pos = self.end;
    }

    pub fn key(&self) -> &Path {
        match (&self.page, self.positioned) {
            (Some(page), true) => &page.cells()[self.row].path,
            _ => &EMPTY_PATH,
        }
    }

    pub fn value(&self) -> Result<f64> {
        match (&self.page, self.positioned) {
            (Some(page), true) => Ok(page.cells()[self.row].value),
            _ => Err(Error::Internal("page scan value read before next()".into())),
        }
    }

    /// Yield point: true exactly once after `next()` moved onto a new page.
    pub fn take_page_entered(&mut self) -> bool {
        std::mem::take(&mut self.entered)
    }

    pub fn reset(&mut self) {
        self.pos = self.start;
        self.page = None;
        self.row = 0;
        self.positioned = false;
        self.entered = false;
    }

    pub fn current_page(&self) -> usize {
        self.pos
    }

    pub fn end_page(&self) -> usize {
        self.end
    }

    pub fn remaining_pages(&self) -> usize {
        self.end.saturating_sub(self.pos)
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn rows_between(&self, from: usize, to: usize) -> u64 {
        self.storage
            .page_row_offset(to)
            .saturating_sub(self.storage.page_row_offset(from))
    }

    /// Dimension at which this scan may be split: the first one the
    /// selection does not pin to a single identifier.
    pub fn split_depth(&self) -> Option<usize> {
        self.area.first_ranging_dim()
    }

    /// First page after the current one whose leading key, up to and
    /// including the split depth, differs from the current row's.
    pub fn jump(&self) -> Result<Option<usize>> {
        let Some(depth) = self.split_depth() else {
            return Ok(None);
        };
        if !self.positioned {
            return Ok(None);
        }
        let prefix = &self.key()[..=depth];

        // Binary search over (pos, end): first-key prefixes are non-decreasing.
        let (mut lo, mut hi) = (self.pos + 1, self.end);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let first = self.storage.page_first_key(mid)?;
            if &first[..=depth] <= prefix {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok((lo < self.end).then_some(lo))
    }

    /// Shrink this scan to `[pos, at)` and return a scan over `[at, end)`.
    ///
    /// `at` must lie strictly after the current page.
    pub fn split_off(&mut self, at: usize) -> Result<PageScan> {
        if at <= self.pos || at > self.end {
            return Err(Error::Internal(format!(
                "split point {at} outside scan range ({}, {}]",
                self.pos, self.end
            )));
        }
        let tail = PageScan::with_range(
            Arc::clone(&self.storage),
            Arc::clone(&self.area),
            at,
            self.end,
        );
        tracing::trace!(from = at, to = self.end, "split page scan");
        self.end = at;
        Ok(tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_storage::MemoryStorage;
    use cubeq_core::path;

    fn storage() -> Arc<dyn CellStorage> {
        let rows: Vec<(Vec<u32>, f64)> = (0..4u32)
            .flat_map(|a| (0..3u32).map(move |b| (vec![a, b], f64::from(a * 10 + b))))
            .collect();
        let rows: Vec<(&[u32], f64)> = rows.iter().map(|(ids, v)| (ids.as_slice(), *v)).collect();
        Arc::new(MemoryStorage::from_rows(2, 2, &rows).unwrap())
    }

    fn drain(scan: &mut PageScan) -> Vec<(Path, f64)> {
        let mut out = Vec::new();
        while scan.next().unwrap() {
            out.push((scan.key().clone(), scan.value().unwrap()));
        }
        out
    }

    #[test]
    fn filters_by_area() {
        let area = Arc::new(Area::from_ids(vec![vec![1, 3], vec![0, 2]]).unwrap());
        let mut scan = PageScan::new(storage(), area);
        let got = drain(&mut scan);
        let paths: Vec<Path> = got.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(paths, vec![path![1, 0], path![1, 2], path![3, 0], path![3, 2]]);
        assert_eq!(got[3].1, 32.0);
        assert!(!scan.next().unwrap());
    }

    #[test]
    fn value_before_next_is_internal_error() {
        let area = Arc::new(Area::from_ids(vec![vec![0], vec![0]]).unwrap());
        let scan = PageScan::new(storage(), area);
        assert!(matches!(scan.value(), Err(Error::Internal(_))));
        assert_eq!(scan.key(), &Path::EMPTY);
    }

    #[test]
    fn reports_page_entry_once() {
        let area = Arc::new(Area::from_ids(vec![vec![0, 1, 2, 3], vec![0, 1, 2]]).unwrap());
        let mut scan = PageScan::new(storage(), area);
        let mut entries = 0;
        while scan.next().unwrap() {
            if scan.take_page_entered() {
                entries += 1;
            }
        }
        assert_eq!(entries, 6);
    }

    #[test]
    fn split_partitions_rows() {
        let area = Arc::new(Area::from_ids(vec![vec![0, 1, 2, 3], vec![0, 1, 2]]).unwrap());
        let mut head = PageScan::new(storage(), Arc::clone(&area));
        assert!(head.next().unwrap());
        assert_eq!(head.split_depth(), Some(0));

        // Row (0,0) sits on page 0; page 2 starts at (1,1).
        let jump = head.jump().unwrap().unwrap();
        assert_eq!(jump, 2);
        assert_eq!(head.rows_between(head.current_page(), jump), 4);

        let mut tail = head.split_off(jump).unwrap();
        assert_eq!(head.remaining_pages(), 2);
        assert_eq!(tail.remaining_pages(), 4);
        let mut first = vec![(head.key().clone(), head.value().unwrap())];
        first.extend(drain(&mut head));
        let second = drain(&mut tail);
        assert_eq!(first.len() + second.len(), 12);
        assert!(first.last().unwrap().0 <= second[0].0);
        assert!(head.split_off(0).is_err());
    }

    #[test]
    fn reset_restarts_range() {
        let area = Arc::new(Area::from_ids(vec![vec![2], vec![0, 1, 2]]).unwrap());
        let mut scan = PageScan::new(storage(), area);
        let once = drain(&mut scan);
        scan.reset();
        assert_eq!(drain(&mut scan), once);
        assert_eq!(once.len(), 3);
    }
}
