//! N-way sorted union of child streams.
//!
//! When several children sit on the same path, the lowest-indexed one
//! supplies the value and the others are advanced in lock-step on the next
//! call, so every path is emitted exactly once.

use cubeq_core::error::{Error, Result};
use cubeq_core::path::{Path, EMPTY_PATH};

use crate::traits::CellStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Start,
    At(usize),
    Done,
}

pub struct CombinationProcessor {
    children: Vec<Box<dyn CellStream>>,
    has_next: Vec<bool>,
    same: Vec<bool>,
    has_same_key: bool,
    cursor: Cursor,
}

impl CombinationProcessor {
    pub fn new(children: Vec<Box<dyn CellStream>>) -> Self {
        let n = children.len();
        Self {
            children,
            has_next: vec![false; n],
            same: vec![false; n],
            has_same_key: false,
            cursor: Cursor::Start,
        }
    }

    /// Index of the child currently supplying key and value.
    pub fn active(&self) -> Option<usize> {
        match self.cursor {
            Cursor::At(i) => Some(i),
            _ => None,
        }
    }

    fn select(&mut self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for i in 0..self.children.len() {
            if !self.has_next[i] {
                continue;
            }
            match best {
                Some(b) if self.children[i].key() >= self.children[b].key() => {}
                _ => best = Some(i),
            }
        }

        self.has_same_key = false;
        self.same.iter_mut().for_each(|s| *s = false);
        let b = best?;
        for i in b + 1..self.children.len() {
            if self.has_next[i] && self.children[i].key() == self.children[b].key() {
                self.same[i] = true;
                self.has_same_key = true;
            }
        }
        Some(b)
    }
}

impl CellStream for CombinationProcessor {
    fn next(&mut self) -> Result<bool> {
        match self.cursor {
            Cursor::Done => return Ok(false),
            Cursor::Start => {
                for (child, has_next) in self.children.iter_mut().zip(self.has_next.iter_mut()) {
                    *has_next = child.next()?;
                }
            }
            Cursor::At(index) => {
                self.has_next[index] = self.children[index].next()?;
                if self.has_same_key {
                    for i in index + 1..self.children.len() {
                        if self.same[i] {
                            self.has_next[i] = self.children[i].next()?;
                        }
                    }
                }
            }
        }

        self.cursor = match self.select() {
            Some(i) => Cursor::At(i),
            None => Cursor::Done,
        };
        Ok(matches!(self.cursor, Cursor::At(_)))
    }

    fn key(&self) -> &Path {
        match self.cursor {
            Cursor::At(i) => self.children[i].key(),
            _ => &EMPTY_PATH,
        }
    }

    fn value(&self) -> Result<f64> {
        match self.cursor {
            Cursor::At(i) => self.children[i].value(),
            _ => Err(Error::Internal(
                "combination value read before a successful next()".into(),
            )),
        }
    }

    fn reset(&mut self) {
        self.cursor = Cursor::Start;
        self.has_same_key = false;
        self.has_next.iter_mut().for_each(|h| *h = false);
        self.same.iter_mut().for_each(|s| *s = false);
        for child in &mut self.children {
            child.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialized::CellVecStream;
    use crate::traits::drain;
    use cubeq_core::cell::Cell;
    use cubeq_core::path;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn child(cells: Vec<(Path, f64)>) -> Box<dyn CellStream> {
        Box::new(CellVecStream::new(
            cells
                .into_iter()
                .map(|(p, v)| Cell::new(p, v))
                .collect::<Vec<_>>(),
        ))
    }

    #[test]
    fn lowest_index_wins_ties() {
        let mut c = CombinationProcessor::new(vec![
            child(vec![(path![1, 1], 5.0), (path![1, 2], 3.0)]),
            child(vec![(path![1, 2], 4.0), (path![1, 3], 2.0)]),
        ]);
        let out = drain(&mut c).unwrap();
        assert_eq!(
            out,
            vec![
                Cell::new(path![1, 1], 5.0),
                Cell::new(path![1, 2], 3.0),
                Cell::new(path![1, 3], 2.0),
            ]
        );
        assert!(!c.next().unwrap());
        assert!(!c.next().unwrap());
    }

    #[test]
    fn unpositioned_reads() {
        let mut c = CombinationProcessor::new(vec![child(vec![(path![1], 1.0)])]);
        assert!(c.key().is_empty());
        assert!(matches!(c.value(), Err(Error::Internal(_))));
        assert!(c.next().unwrap());
        assert_eq!(c.active(), Some(0));
    }

    #[test]
    fn no_children_is_exhausted() {
        let mut c = CombinationProcessor::new(vec![]);
        assert!(!c.next().unwrap());
    }

    #[test]
    fn reset_replays_sequence() {
        let mut c = CombinationProcessor::new(vec![
            child(vec![(path![2], 1.0), (path![4], 1.0)]),
            child(vec![(path![1], 2.0), (path![2], 2.0), (path![3], 2.0)]),
            child(vec![(path![2], 3.0), (path![5], 3.0)]),
        ]);
        let first = drain(&mut c).unwrap();
        c.reset();
        assert_eq!(drain(&mut c).unwrap(), first);
        assert_eq!(first.len(), 5);
        assert_eq!(first[1], Cell::new(path![2], 1.0));
    }

    fn overlapping() -> CombinationProcessor {
        CombinationProcessor::new(vec![
            child(vec![(path![1, 1], 5.0), (path![1, 4], 3.0)]),
            child(vec![(path![1, 2], 7.0), (path![1, 4], 4.0), (path![1, 6], 2.0)]),
        ])
    }

    #[test]
    fn seek_onto_tied_path_takes_first_child() {
        let mut c = overlapping();
        assert!(c.seek(&path![1, 4]).unwrap());
        assert_eq!(c.key(), &path![1, 4]);
        assert_eq!(c.value().unwrap(), 3.0);
        assert_eq!(c.active(), Some(0));

        // The tied child moves along too.
        assert!(c.next().unwrap());
        assert_eq!(c.key(), &path![1, 6]);
        assert!(!c.next().unwrap());
    }

    #[test]
    fn seek_between_keys_lands_on_next_path() {
        let mut c = overlapping();
        assert!(c.seek(&path![1, 3]).unwrap());
        assert_eq!(c.key(), &path![1, 4]);

        // Already past the target: stays put.
        assert!(c.seek(&path![1, 2]).unwrap());
        assert_eq!(c.key(), &path![1, 4]);
        assert_eq!(c.value().unwrap(), 3.0);
    }

    #[test]
    fn seek_past_end_exhausts() {
        let mut c = overlapping();
        assert!(c.next().unwrap());
        assert!(!c.seek(&path![2, 0]).unwrap());
        assert!(c.key().is_empty());
        assert!(!c.next().unwrap());

        c.reset();
        assert!(c.seek(&path![1, 6]).unwrap());
        assert_eq!(c.value().unwrap(), 2.0);
    }

    fn arb_stream() -> impl Strategy<Value = BTreeMap<(u32, u32), i32>> {
        prop::collection::btree_map((0u32..6, 0u32..6), -50i32..50, 0..20)
    }

    proptest! {
        #[test]
        fn prop_union_takes_first_child_value(inputs in prop::collection::vec(arb_stream(), 0..5)) {
            let mut expected: BTreeMap<(u32, u32), f64> = BTreeMap::new();
            for input in &inputs {
                for (k, v) in input {
                    expected.entry(*k).or_insert(f64::from(*v));
                }
            }

            let children = inputs
                .iter()
                .map(|input| {
                    child(input.iter().map(|((a, b), v)| (path![*a, *b], f64::from(*v))).collect())
                })
                .collect();
            let mut c = CombinationProcessor::new(children);
            let got = drain(&mut c).unwrap();

            let want: Vec<Cell> = expected
                .into_iter()
                .map(|((a, b), v)| Cell::new(path![a, b], v))
                .collect();
            prop_assert_eq!(got, want);
        }
    }
}
