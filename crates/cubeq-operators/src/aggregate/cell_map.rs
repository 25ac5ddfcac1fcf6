//! Aggregation accumulators.
//!
//! Two interchangeable forms, chosen from the target area's size:
//! - [`HashedCells`]: dense slots addressed by the area's row-major offset.
//!   Used for small targets; draining in offset order is path order.
//! - [`OrderedCells`]: a `BTreeMap` over translated binary keys, optionally
//!   capped. Once over its cap it drops its largest key and ignores any new
//!   key at or above the dropped one, so it always holds the smallest paths
//!   with complete totals.

use std::collections::BTreeMap;
use std::sync::Arc;

use cubeq_core::area::Area;
use cubeq_core::cell::Cell;
use cubeq_core::error::{Error, Result};
use cubeq_core::path::Path;
use cubeq_core::translator::{BinPath, PathTranslator};

pub enum CellMap {
    Hashed(HashedCells),
    Ordered(OrderedCells),
}

impl CellMap {
    /// Picks the representation for `area`. `max_count == 0` means uncapped.
    pub fn for_area(area: &Arc<Area>, hash_threshold: u64, max_count: u64) -> Self {
        if area.size() < hash_threshold {
            CellMap::Hashed(HashedCells::new(Arc::clone(area)))
        } else {
            let limit = if max_count == 0 { 0 } else { max_count.saturating_add(1) };
            CellMap::Ordered(OrderedCells::new(PathTranslator::for_area(area), limit))
        }
    }

    pub fn add(&mut self, path: &Path, value: f64) -> Result<()> {
        self.upsert(path, value, |old, v| old + v)
    }

    /// Insert `value`, or fold it into the existing entry with `combine`.
    pub fn upsert(&mut self, path: &Path, value: f64, combine: fn(f64, f64) -> f64) -> Result<()> {
        match self {
            CellMap::Hashed(m) => m.upsert(path, value, combine),
            CellMap::Ordered(m) => {
                let key = m.translator.path_to_bin(path)?;
                m.upsert(key, value, combine);
                Ok(())
            }
        }
    }

    pub fn get(&self, path: &Path) -> Option<f64> {
        match self {
            CellMap::Hashed(m) => m.get(path),
            CellMap::Ordered(m) => m.get(path),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CellMap::Hashed(m) => m.len,
            CellMap::Ordered(m) => m.cells.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold every entry of `other` into `self`.
    pub fn merge_from(&mut self, other: CellMap, combine: fn(f64, f64) -> f64) -> Result<()> {
        match (self, other) {
            (CellMap::Hashed(a), CellMap::Hashed(b)) => a.merge_from(b, combine),
            (CellMap::Ordered(a), CellMap::Ordered(b)) => {
                a.merge_from(b, combine);
                Ok(())
            }
            _ => Err(Error::Internal(
                "cannot merge accumulators of different representations".into(),
            )),
        }
    }

    /// True once a capped map has dropped any key.
    pub fn is_truncated(&self) -> bool {
        match self {
            CellMap::Hashed(_) => false,
            CellMap::Ordered(m) => m.is_truncated(),
        }
    }

    /// Entries in ascending path order.
    pub fn into_cells(self) -> Vec<Cell> {
        match self {
            CellMap::Hashed(m) => m.into_cells(),
            CellMap::Ordered(m) => m.into_cells(),
        }
    }
}

pub struct HashedCells {
    area: Arc<Area>,
    slots: Vec<Option<f64>>,
    len: usize,
}

impl HashedCells {
    pub fn new(area: Arc<Area>) -> Self {
        let size = usize::try_from(area.size()).unwrap_or(usize::MAX);
        Self {
            slots: vec![None; size],
            area,
            len: 0,
        }
    }

    fn slot(&self, path: &Path) -> Result<usize> {
        self.area
            .offset_of(path)
            .map(|o| o as usize)
            .ok_or_else(|| Error::Internal(format!("path {path} outside dense accumulator area")))
    }

    fn upsert(&mut self, path: &Path, value: f64, combine: fn(f64, f64) -> f64) -> Result<()> {
        let slot = self.slot(path)?;
        match &mut self.slots[slot] {
            Some(old) => *old = combine(*old, value),
            empty => {
                *empty = Some(value);
                self.len += 1;
            }
        }
        Ok(())
    }

    fn get(&self, path: &Path) -> Option<f64> {
        self.area.offset_of(path).and_then(|o| self.slots[o as usize])
    }

    fn merge_from(&mut self, other: HashedCells, combine: fn(f64, f64) -> f64) -> Result<()> {
        if self.area != other.area {
            return Err(Error::Internal("dense accumulators cover different areas".into()));
        }
        for (mine, theirs) in self.slots.iter_mut().zip(other.slots) {
            let Some(v) = theirs else { continue };
            match mine {
                Some(old) => *old = combine(*old, v),
                None => {
                    *mine = Some(v);
                    self.len += 1;
                }
            }
        }
        Ok(())
    }

    fn into_cells(self) -> Vec<Cell> {
        let area = self.area;
        self.slots
            .into_iter()
            .enumerate()
            .filter_map(|(offset, v)| {
                let value = v?;
                area.path_at(offset as u64).map(|path| Cell::new(path, value))
            })
            .collect()
    }
}

pub struct OrderedCells {
    translator: PathTranslator,
    cells: BTreeMap<BinPath, f64>,
    limit: u64,
    // Smallest key dropped so far; everything at or above it is incomplete.
    evicted: Option<BinPath>,
}

impl OrderedCells {
    /// `limit == 0` disables the cap.
    pub fn new(translator: PathTranslator, limit: u64) -> Self {
        Self {
            translator,
            cells: BTreeMap::new(),
            limit,
            evicted: None,
        }
    }

    /// True once the cap has forced any key out.
    pub fn is_truncated(&self) -> bool {
        self.evicted.is_some()
    }

    fn upsert(&mut self, key: BinPath, value: f64, combine: fn(f64, f64) -> f64) {
        if let Some(old) = self.cells.get_mut(&key) {
            *old = combine(*old, value);
            return;
        }
        if self.evicted.as_ref().is_some_and(|e| key >= *e) {
            return;
        }
        self.cells.insert(key, value);
        self.enforce_limit();
    }

    fn enforce_limit(&mut self) {
        if self.limit == 0 {
            return;
        }
        while self.cells.len() as u64 > self.limit {
            if let Some((key, _)) = self.cells.pop_last() {
                self.evicted = Some(key);
            }
        }
    }

    fn get(&self, path: &Path) -> Option<f64> {
        let key = self.translator.path_to_bin(path).ok()?;
        self.cells.get(&key).copied()
    }

    fn merge_from(&mut self, other: OrderedCells, combine: fn(f64, f64) -> f64) {
        let cut = match (self.evicted.take(), other.evicted) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        for (key, value) in other.cells {
            if let Some(old) = self.cells.get_mut(&key) {
                *old = combine(*old, value);
            } else {
                self.cells.insert(key, value);
            }
        }
        if let Some(cut) = cut {
            // Entries at or above either side's cut may miss contributions.
            self.cells.split_off(&cut);
            self.evicted = Some(cut);
        }
        self.enforce_limit();
    }

    fn into_cells(self) -> Vec<Cell> {
        let translator = self.translator;
        self.cells
            .into_iter()
            .map(|(key, value)| Cell::new(translator.bin_to_path(&key), value))
            .collect()
    }
}
