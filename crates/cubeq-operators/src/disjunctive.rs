//! Union of overlapping rectangular areas without double emission.
//!
//! Every child is a dense stream over its own area (e.g. a constant). Each
//! child carries an odometer over its area's cross-product; the operator
//! emits the smallest pending path across children, attributing a path
//! covered by several children to the one that pins the most dimensions
//! (then to the earliest in canonical order). Children sharing the emitted
//! path advance together, so no path comes out twice.
//!
//! Children are put in canonical order (first path, then specificity) and
//! cut into independent segments wherever neighbours are disjoint in some
//! dimension and no earlier child reaches past the next child's first path.
//! Segments are enumerated one after another, which keeps the per-step
//! comparison to the children that can actually collide.

use std::cmp::{Ordering, Reverse};
use std::ops::Range;
use std::sync::Arc;

use cubeq_core::area::Area;
use cubeq_core::error::{Error, Result};
use cubeq_core::path::{Path, EMPTY_PATH};

use crate::traits::CellStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Odometer {
    Fresh,
    Ready,
    Exhausted,
}

struct Branch {
    area: Arc<Area>,
    stream: Box<dyn CellStream>,
    counter: Vec<usize>,
    path: Path,
    state: Odometer,
    singletons: usize,
}

impl Branch {
    fn new(area: Arc<Area>, stream: Box<dyn CellStream>) -> Self {
        Self {
            counter: vec![0; area.dim_count()],
            singletons: area.singleton_count(),
            path: Path::EMPTY,
            state: Odometer::Fresh,
            area,
            stream,
        }
    }

    fn advance(&mut self) -> Result<()> {
        match self.state {
            Odometer::Exhausted => return Ok(()),
            Odometer::Fresh => match self.area.first_path() {
                Some(first) => {
                    self.counter.iter_mut().for_each(|c| *c = 0);
                    self.path = first;
                }
                None => {
                    self.state = Odometer::Exhausted;
                    return Ok(());
                }
            },
            Odometer::Ready => {
                if !self.step() {
                    self.state = Odometer::Exhausted;
                    return Ok(());
                }
            }
        }
        self.state = Odometer::Ready;
        self.pull()
    }

    /// Odometer increment, innermost dimension first. False on overflow.
    fn step(&mut self) -> bool {
        for d in (0..self.counter.len()).rev() {
            let ids = self.area.dim(d);
            self.counter[d] += 1;
            if self.counter[d] < ids.len() {
                self.path.set(d, ids[self.counter[d]]);
                return true;
            }
            self.counter[d] = 0;
            self.path.set(d, ids[0]);
        }
        false
    }

    // The child stream must materialize exactly the odometer's path.
    fn pull(&mut self) -> Result<()> {
        if !self.stream.next()? {
            return Err(Error::Internal(format!(
                "disjunctive child ended before expected path {}",
                self.path
            )));
        }
        if self.stream.key() != &self.path {
            return Err(Error::Internal(format!(
                "disjunctive child produced {} where {} was expected",
                self.stream.key(),
                self.path
            )));
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.state = Odometer::Fresh;
        self.path = Path::EMPTY;
        self.stream.reset();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Start,
    At(usize),
    Done,
}

pub struct DisjunctiveCombinationProcessor {
    branches: Vec<Branch>,
    first_diff: Vec<Option<usize>>,
    segments: Vec<Range<usize>>,
    segment: usize,
    ties: Vec<usize>,
    cursor: Cursor,
}

impl DisjunctiveCombinationProcessor {
    /// `area` is the node's own target; a zero-dimension target yields nothing.
    ///
    /// Every child must have the target's dimension count (`Error::Plan`).
    pub fn new(area: &Area, children: Vec<(Arc<Area>, Box<dyn CellStream>)>) -> Result<Self> {
        let dims = area.dim_count();
        let mut branches: Vec<Branch> = Vec::new();
        if dims > 0 {
            for (child, stream) in children {
                if child.dim_count() != dims {
                    return Err(Error::Plan(format!(
                        "disjunctive child has {} dimensions, target has {dims}",
                        child.dim_count()
                    )));
                }
                branches.push(Branch::new(child, stream));
            }
        }
        branches.sort_by(|a, b| canonical_order(&a.area, &b.area));

        let first_diff: Vec<Option<usize>> = branches
            .windows(2)
            .map(|w| (0..w[0].area.dim_count()).find(|&d| w[0].area.disjoint_in(&w[1].area, d)))
            .collect();
        let segments = segment(&branches, &first_diff);

        Ok(Self {
            branches,
            first_diff,
            segments,
            segment: 0,
            ties: Vec::new(),
            cursor: Cursor::Start,
        })
    }

    /// Number of independently enumerated child groups.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// First dimension in which sorted neighbours `i` and `i + 1` share nothing.
    pub fn first_diff(&self, i: usize) -> Option<usize> {
        self.first_diff.get(i).copied().flatten()
    }

    fn start_segment(&mut self) -> Result<()> {
        for i in self.segments[self.segment].clone() {
            self.branches[i].advance()?;
        }
        Ok(())
    }

    fn pick(&mut self) -> Option<usize> {
        let range = self.segments[self.segment].clone();
        let best = range
            .clone()
            .filter(|&i| self.branches[i].state == Odometer::Ready)
            .min_by(|&a, &b| {
                let (x, y) = (&self.branches[a], &self.branches[b]);
                x.path
                    .cmp(&y.path)
                    .then_with(|| Reverse(x.singletons).cmp(&Reverse(y.singletons)))
                    .then_with(|| a.cmp(&b))
            })?;

        self.ties.clear();
        for i in range {
            if i != best
                && self.branches[i].state == Odometer::Ready
                && self.branches[i].path == self.branches[best].path
            {
                self.ties.push(i);
            }
        }
        Some(best)
    }
}

/// Earlier first path first; among equal first paths the more specific
/// area comes first.
fn canonical_order(a: &Area, b: &Area) -> Ordering {
    a.first_path()
        .cmp(&b.first_path())
        .then_with(|| b.singleton_count().cmp(&a.singleton_count()))
}

fn segment(branches: &[Branch], first_diff: &[Option<usize>]) -> Vec<Range<usize>> {
    if branches.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut start = 0;
    let mut reach: Option<Path> = None;
    for i in 0..branches.len() {
        let last = branches[i].area.last_path();
        if last > reach {
            reach = last;
        }
        if i + 1 < branches.len()
            && first_diff[i].is_some()
            && reach < branches[i + 1].area.first_path()
        {
            out.push(start..i + 1);
            start = i + 1;
        }
    }
    out.push(start..branches.len());
    out
}

impl CellStream for DisjunctiveCombinationProcessor {
    fn next(&mut self) -> Result<bool> {
        match self.cursor {
            Cursor::Done => return Ok(false),
            Cursor::Start => {
                if self.segments.is_empty() {
                    self.cursor = Cursor::Done;
                    return Ok(false);
                }
                self.segment = 0;
                self.start_segment()?;
            }
            Cursor::At(active) => {
                self.branches[active].advance()?;
                for k in 0..self.ties.len() {
                    let i = self.ties[k];
                    self.branches[i].advance()?;
                }
            }
        }

        loop {
            if let Some(best) = self.pick() {
                self.cursor = Cursor::At(best);
                return Ok(true);
            }
            self.segment += 1;
            if self.segment >= self.segments.len() {
                self.cursor = Cursor::Done;
                return Ok(false);
            }
            self.start_segment()?;
        }
    }

    fn key(&self) -> &Path {
        match self.cursor {
            Cursor::At(i) => self.branches[i].stream.key(),
            _ => &EMPTY_PATH,
        }
    }

    fn value(&self) -> Result<f64> {
        match self.cursor {
            Cursor::At(i) => self.branches[i].stream.value(),
            _ => Err(Error::Internal(
                "disjunctive combination value read before a successful next()".into(),
            )),
        }
    }

    fn reset(&mut self) {
        for branch in &mut self.branches {
            branch.reset();
        }
        self.ties.clear();
        self.segment = 0;
        self.cursor = Cursor::Start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::ConstantStream;
    use crate::materialized::CellVecStream;
    use crate::traits::drain;
    use cubeq_core::cell::Cell;
    use cubeq_core::path;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn constant(dims: Vec<Vec<u32>>, value: f64) -> (Arc<Area>, Box<dyn CellStream>) {
        let area = Arc::new(Area::from_ids(dims).unwrap());
        let stream: Box<dyn CellStream> = Box::new(ConstantStream::new(Arc::clone(&area), value));
        (area, stream)
    }

    fn target(dims: usize) -> Area {
        Area::from_ids(vec![vec![0, 1, 2, 3]; dims]).unwrap()
    }

    #[test]
    fn overlapping_coordinate_emitted_once() {
        let mut d = DisjunctiveCombinationProcessor::new(
            &target(2),
            vec![
                constant(vec![vec![1], vec![1, 2, 3]], 1.0),
                constant(vec![vec![1, 2], vec![2]], 2.0),
            ],
        ).unwrap();
        let out = drain(&mut d).unwrap();
        assert_eq!(
            out,
            vec![
                Cell::new(path![1, 1], 1.0),
                Cell::new(path![1, 2], 1.0),
                Cell::new(path![1, 3], 1.0),
                Cell::new(path![2, 2], 2.0),
            ]
        );
        assert!(!d.next().unwrap());
    }

    #[test]
    fn more_specific_child_wins() {
        let mut d = DisjunctiveCombinationProcessor::new(
            &target(2),
            vec![
                constant(vec![vec![1, 2], vec![1, 2]], 1.0),
                constant(vec![vec![2], vec![2]], 9.0),
            ],
        ).unwrap();
        let out = drain(&mut d).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[3], Cell::new(path![2, 2], 9.0));
    }

    #[test]
    fn disjoint_children_form_segments() {
        let d = DisjunctiveCombinationProcessor::new(
            &target(2),
            vec![
                constant(vec![vec![2], vec![1, 2]], 2.0),
                constant(vec![vec![1], vec![1, 2]], 1.0),
                constant(vec![vec![1, 2], vec![3]], 3.0),
            ],
        ).unwrap();
        // Sorted: (1,{1,2}), ({1,2},3), (2,{1,2}). The first ends before the
        // second starts; the last two interleave and share a segment.
        assert_eq!(d.first_diff(0), Some(1));
        assert_eq!(d.first_diff(1), Some(1));
        assert_eq!(d.segment_count(), 2);

        let mut d = DisjunctiveCombinationProcessor::new(
            &target(2),
            vec![
                constant(vec![vec![2], vec![1, 2]], 2.0),
                constant(vec![vec![1], vec![1, 2]], 1.0),
            ],
        ).unwrap();
        assert_eq!(d.first_diff(0), Some(0));
        assert_eq!(d.segment_count(), 2);
        let values: Vec<f64> = drain(&mut d).unwrap().iter().map(|c| c.value).collect();
        assert_eq!(values, vec![1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn empty_inputs_are_exhausted() {
        let mut none = DisjunctiveCombinationProcessor::new(&target(2), vec![]).unwrap();
        assert!(!none.next().unwrap());

        let mut zero_dim = DisjunctiveCombinationProcessor::new(
            &Area::new(vec![]).unwrap(),
            vec![constant(vec![vec![1]], 1.0)],
        ).unwrap();
        assert!(!zero_dim.next().unwrap());
        assert!(zero_dim.value().is_err());
    }

    #[test]
    fn sparse_child_is_an_internal_error() {
        let area = Arc::new(Area::from_ids(vec![vec![1, 2]]).unwrap());
        let sparse: Box<dyn CellStream> =
            Box::new(CellVecStream::new(vec![Cell::new(path![1], 1.0)]));
        let mut d =
            DisjunctiveCombinationProcessor::new(&target(1), vec![(area, sparse)]).unwrap();
        assert!(d.next().unwrap());
        assert!(matches!(d.next(), Err(Error::Internal(_))));
    }

    #[test]
    fn reset_replays_sequence() {
        let mut d = DisjunctiveCombinationProcessor::new(
            &target(3),
            vec![
                constant(vec![vec![0, 1], vec![2], vec![0, 1]], 1.0),
                constant(vec![vec![1], vec![0, 1, 2], vec![1]], 2.0),
                constant(vec![vec![3], vec![3], vec![3]], 3.0),
            ],
        ).unwrap();
        let first = drain(&mut d).unwrap();
        d.reset();
        assert_eq!(drain(&mut d).unwrap(), first);
    }

    fn example_union() -> DisjunctiveCombinationProcessor {
        DisjunctiveCombinationProcessor::new(
            &target(2),
            vec![
                constant(vec![vec![1], vec![1, 2, 3]], 1.0),
                constant(vec![vec![1, 2], vec![2]], 2.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn seek_onto_shared_path_emits_it_once() {
        let mut d = example_union();
        assert!(d.seek(&path![1, 2]).unwrap());
        assert_eq!(d.key(), &path![1, 2]);
        assert_eq!(d.value().unwrap(), 1.0);

        assert!(d.next().unwrap());
        assert_eq!(d.key(), &path![1, 3]);
        assert!(d.next().unwrap());
        assert_eq!(d.key(), &path![2, 2]);
        assert!(!d.next().unwrap());
    }

    #[test]
    fn seek_between_children_and_backwards() {
        let mut d = example_union();
        assert!(d.seek(&path![1, 4]).unwrap());
        assert_eq!(d.key(), &path![2, 2]);
        assert_eq!(d.value().unwrap(), 2.0);

        assert!(d.seek(&path![1, 1]).unwrap());
        assert_eq!(d.key(), &path![2, 2]);
    }

    #[test]
    fn seek_past_end_exhausts() {
        let mut d = example_union();
        assert!(!d.seek(&path![3, 0]).unwrap());
        assert!(d.key().is_empty());
        assert!(!d.next().unwrap());

        d.reset();
        assert!(d.seek(&path![1, 3]).unwrap());
        assert_eq!(d.value().unwrap(), 1.0);
    }

    #[test]
    fn mismatched_child_dimensions_are_rejected() {
        let result = DisjunctiveCombinationProcessor::new(
            &target(2),
            vec![
                constant(vec![vec![1], vec![1, 2]], 1.0),
                constant(vec![vec![1, 2]], 2.0),
            ],
        );
        assert!(matches!(result, Err(Error::Plan(_))));
    }

    fn arb_area() -> impl Strategy<Value = Vec<Vec<u32>>> {
        prop::collection::vec(prop::collection::btree_set(0u32..4, 1..4), 2)
            .prop_map(|dims| dims.into_iter().map(|s| s.into_iter().collect()).collect())
    }

    proptest! {
        #[test]
        fn prop_emits_union_once_with_most_specific_owner(areas in prop::collection::vec(arb_area(), 0..5)) {
            let areas: Vec<Area> = areas.into_iter().map(|a| Area::from_ids(a).unwrap()).collect();
            let children = areas
                .iter()
                .enumerate()
                .map(|(i, a)| {
                    let area = Arc::new(a.clone());
                    let stream: Box<dyn CellStream> = Box::new(ConstantStream::new(Arc::clone(&area), i as f64));
                    (area, stream)
                })
                .collect();
            let mut d = DisjunctiveCombinationProcessor::new(&target(2), children).unwrap();
            let out = drain(&mut d).unwrap();

            let expected: BTreeSet<Path> = areas.iter().flat_map(|a| a.paths()).collect();
            let got: Vec<Path> = out.iter().map(|c| c.path.clone()).collect();
            prop_assert!(got.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(got, expected.into_iter().collect::<Vec<_>>());

            for cell in &out {
                let owner = &areas[cell.value as usize];
                prop_assert!(owner.contains(&cell.path));
                let best = areas
                    .iter()
                    .filter(|a| a.contains(&cell.path))
                    .map(Area::singleton_count)
                    .max()
                    .unwrap();
                prop_assert_eq!(owner.singleton_count(), best);
            }
        }
    }
}
