//! What an aggregation produces and how one contribution lands in it.
//!
//! [`AggregationTarget`] is immutable and shared (`Arc`) between the calling
//! thread and any worker jobs; [`ParentExpander`] and [`AggregationState`]
//! are per-worker.

use std::sync::Arc;

use cubeq_core::aggregation::{AggregationFunction, AggregationMap, Target};
use cubeq_core::area::Area;
use cubeq_core::cell::Cell;
use cubeq_core::error::{Error, Result};
use cubeq_core::id::Identifier;
use cubeq_core::path::Path;

use super::cell_map::CellMap;

#[derive(Debug, Clone)]
pub struct AggregationTarget {
    area: Arc<Area>,
    function: AggregationFunction,
    maps: Option<Arc<Vec<AggregationMap>>>,
    max_count: u64,
    hash_threshold: u64,
}

impl AggregationTarget {
    pub fn new(area: Arc<Area>, function: AggregationFunction) -> Self {
        Self {
            area,
            function,
            maps: None,
            max_count: 0,
            hash_threshold: 1000,
        }
    }

    pub fn with_maps(mut self, maps: Option<Arc<Vec<AggregationMap>>>) -> Self {
        self.maps = maps;
        self
    }

    pub fn with_max_count(mut self, max_count: u64) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn with_hash_threshold(mut self, hash_threshold: u64) -> Self {
        self.hash_threshold = hash_threshold;
        self
    }

    pub fn area(&self) -> &Arc<Area> {
        &self.area
    }

    pub fn function(&self) -> AggregationFunction {
        self.function
    }

    pub fn new_map(&self) -> CellMap {
        CellMap::for_area(&self.area, self.hash_threshold, self.max_count)
    }

    pub fn expander(&self) -> ParentExpander {
        ParentExpander::new(Arc::clone(&self.area), self.maps.clone())
    }

    /// How two partial values of the same cell combine.
    pub fn combine(&self) -> fn(f64, f64) -> f64 {
        match self.function {
            AggregationFunction::Max => f64::max,
            AggregationFunction::Min => f64::min,
            AggregationFunction::Sum | AggregationFunction::Avg | AggregationFunction::Count => {
                |a, b| a + b
            }
        }
    }

    /// Fold one source contribution into `state`.
    pub fn accumulate(
        &self,
        state: &mut AggregationState,
        expander: &mut ParentExpander,
        source: &Path,
        value: f64,
    ) -> Result<()> {
        state.contributions += 1;
        let function = self.function;
        let combine = self.combine();
        expander.for_each_parent(source, |parent, weight| {
            let values = state.values.get_or_insert_with(|| self.new_map());
            match function {
                AggregationFunction::Sum => values.add(parent, value * weight),
                AggregationFunction::Count => values.add(parent, 1.0),
                AggregationFunction::Max | AggregationFunction::Min => {
                    values.upsert(parent, value, combine)
                }
                AggregationFunction::Avg => {
                    values.add(parent, value)?;
                    state
                        .counts
                        .get_or_insert_with(|| self.new_map())
                        .add(parent, 1.0)
                }
            }
        })
    }

    /// Fold a finished partial state into `into`.
    pub fn merge(&self, into: &mut AggregationState, other: AggregationState) -> Result<()> {
        into.contributions += other.contributions;
        let combine = self.combine();
        merge_slot(&mut into.values, other.values, combine)?;
        merge_slot(&mut into.counts, other.counts, |a, b| a + b)
    }

    /// Final sorted cells of a finished state.
    pub fn finish(&self, state: AggregationState) -> Result<Vec<Cell>> {
        let Some(values) = state.values else {
            return Ok(Vec::new());
        };
        if values.is_truncated() {
            tracing::debug!(
                max_count = self.max_count,
                "aggregation result truncated at its cap"
            );
        }
        let mut cells = values.into_cells();
        if self.function == AggregationFunction::Avg {
            let counts = state.counts.map(CellMap::into_cells).unwrap_or_default();
            if counts.len() != cells.len() {
                return Err(Error::Internal(format!(
                    "average has {} sums but {} counts",
                    cells.len(),
                    counts.len()
                )));
            }
            for (cell, count) in cells.iter_mut().zip(counts) {
                if cell.path != count.path {
                    return Err(Error::Internal(format!(
                        "average sum at {} paired with count at {}",
                        cell.path, count.path
                    )));
                }
                cell.value /= count.value;
            }
        }
        Ok(cells)
    }
}

fn merge_slot(
    into: &mut Option<CellMap>,
    other: Option<CellMap>,
    combine: fn(f64, f64) -> f64,
) -> Result<()> {
    let Some(theirs) = other else {
        return Ok(());
    };
    match into {
        Some(mine) => mine.merge_from(theirs, combine),
        None => {
            *into = Some(theirs);
            Ok(())
        }
    }
}

/// Accumulator state of one worker. Maps are allocated on first use.
#[derive(Default)]
pub struct AggregationState {
    values: Option<CellMap>,
    counts: Option<CellMap>,
    contributions: u64,
}

impl AggregationState {
    pub fn contributions(&self) -> u64 {
        self.contributions
    }

    pub fn is_allocated(&self) -> bool {
        self.values.is_some()
    }

    pub fn len(&self) -> usize {
        self.values.as_ref().map_or(0, CellMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Expands a source path into weighted parent paths inside the target area.
///
/// Per-dimension target lists are cached against the previous source id,
/// which is cheap for sorted input where leading dimensions rarely change.
pub struct ParentExpander {
    area: Arc<Area>,
    maps: Option<Arc<Vec<AggregationMap>>>,
    last_source: Vec<Option<Identifier>>,
    targets: Vec<Vec<Target>>,
    counter: Vec<usize>,
}

impl ParentExpander {
    fn new(area: Arc<Area>, maps: Option<Arc<Vec<AggregationMap>>>) -> Self {
        let dims = area.dim_count();
        Self {
            area,
            maps,
            last_source: vec![None; dims],
            targets: vec![Vec::new(); dims],
            counter: vec![0; dims],
        }
    }

    pub fn for_each_parent(
        &mut self,
        source: &Path,
        mut f: impl FnMut(&Path, f64) -> Result<()>,
    ) -> Result<()> {
        let Some(maps) = &self.maps else {
            if self.area.contains(source) {
                f(source, 1.0)?;
            }
            return Ok(());
        };
        if source.dim_count() != self.area.dim_count() {
            return Err(Error::Internal(format!(
                "source path {source} does not match a {}-dimensional target",
                self.area.dim_count()
            )));
        }

        for (d, id) in source.iter().enumerate() {
            if self.last_source[d] == Some(*id) {
                continue;
            }
            let allowed = self.area.dim(d);
            let targets = &mut self.targets[d];
            targets.clear();
            match maps[d].targets(*id) {
                Some(mapped) => targets.extend(
                    mapped
                        .iter()
                        .filter(|t| allowed.binary_search(&t.id).is_ok())
                        .copied(),
                ),
                None if allowed.binary_search(id).is_ok() => {
                    targets.push(Target { id: *id, weight: 1.0 })
                }
                None => {}
            }
            self.last_source[d] = Some(*id);
        }
        if self.targets.iter().any(Vec::is_empty) {
            return Ok(());
        }

        // Odometer over the per-dimension target lists.
        self.counter.iter_mut().for_each(|c| *c = 0);
        let mut parent = Path::new(self.targets.iter().map(|t| t[0].id).collect());
        loop {
            let weight = self
                .targets
                .iter()
                .zip(&self.counter)
                .map(|(t, &c)| t[c].weight)
                .product();
            f(&parent, weight)?;

            let mut d = self.counter.len();
            loop {
                if d == 0 {
                    return Ok(());
                }
                d -= 1;
                self.counter[d] += 1;
                if self.counter[d] < self.targets[d].len() {
                    parent.set(d, self.targets[d][self.counter[d]].id);
                    break;
                }
                self.counter[d] = 0;
                parent.set(d, self.targets[d][0].id);
            }
        }
    }
}
