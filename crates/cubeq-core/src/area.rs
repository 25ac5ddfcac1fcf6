//! Rectangular selections over a cube.
//!
//! An [`Area`] holds, per dimension, a sorted and de-duplicated set of
//! identifiers; it stands for the cross-product of those sets. Dimension sets
//! are never empty. A zero-dimension area is legal and contains no paths.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::Identifier;
use crate::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Identifier>>", into = "Vec<Vec<Identifier>>")]
pub struct Area {
    dims: Vec<Vec<Identifier>>,
}

impl Area {
    pub fn new(mut dims: Vec<Vec<Identifier>>) -> Result<Self> {
        for (d, ids) in dims.iter_mut().enumerate() {
            if ids.is_empty() {
                return Err(Error::Plan(format!("area dimension {d} has no elements")));
            }
            ids.sort_unstable();
            ids.dedup();
        }
        Ok(Self { dims })
    }

    pub fn from_ids(dims: Vec<Vec<u32>>) -> Result<Self> {
        Self::new(
            dims.into_iter()
                .map(|ids| ids.into_iter().map(Identifier::new).collect())
                .collect(),
        )
    }

    pub fn dim_count(&self) -> usize {
        self.dims.len()
    }

    pub fn dim(&self, d: usize) -> &[Identifier] {
        &self.dims[d]
    }

    /// Number of paths in the area (saturating). Zero for a zero-dimension area.
    pub fn size(&self) -> u64 {
        if self.dims.is_empty() {
            return 0;
        }
        self.dims
            .iter()
            .fold(1u64, |acc, ids| acc.saturating_mul(ids.len() as u64))
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    pub fn is_singleton(&self, d: usize) -> bool {
        self.dims[d].len() == 1
    }

    pub fn singleton(&self, d: usize) -> Option<Identifier> {
        match self.dims[d].as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub fn singleton_count(&self) -> usize {
        self.dims.iter().filter(|ids| ids.len() == 1).count()
    }

    /// First dimension ranging over more than one identifier.
    pub fn first_ranging_dim(&self) -> Option<usize> {
        self.dims.iter().position(|ids| ids.len() > 1)
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.dim_count() == self.dims.len()
            && self
                .dims
                .iter()
                .zip(path.iter())
                .all(|(ids, id)| ids.binary_search(id).is_ok())
    }

    /// True when both areas select no common identifier in dimension `d`.
    pub fn disjoint_in(&self, other: &Area, d: usize) -> bool {
        let (a, b) = (&self.dims[d], &other.dims[d]);
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => return false,
            }
        }
        true
    }

    pub fn first_path(&self) -> Option<Path> {
        if self.dims.is_empty() {
            return None;
        }
        Some(Path::new(self.dims.iter().map(|ids| ids[0]).collect()))
    }

    pub fn last_path(&self) -> Option<Path> {
        if self.dims.is_empty() {
            return None;
        }
        Some(Path::new(
            self.dims.iter().map(|ids| ids[ids.len() - 1]).collect(),
        ))
    }

    /// Largest identifier per dimension; feeds [`crate::translator::PathTranslator`].
    pub fn max_ids(&self) -> Vec<Identifier> {
        self.dims.iter().map(|ids| ids[ids.len() - 1]).collect()
    }

    /// First path of the area that is `>= key`, if any.
    pub fn lower_bound(&self, key: &Path) -> Option<Path> {
        let n = self.dims.len();
        if n == 0 || key.dim_count() != n {
            return None;
        }

        let mut exact = 0;
        while exact < n && self.dims[exact].binary_search(&key[exact]).is_ok() {
            exact += 1;
        }
        if exact == n {
            return Some(key.clone());
        }

        // Bump the deepest dimension that still has a larger identifier and
        // reset everything to its right to the first element.
        for d in (0..=exact).rev() {
            let ids = &self.dims[d];
            let idx = ids.partition_point(|id| *id <= key[d]);
            if idx < ids.len() {
                let mut out = Vec::with_capacity(n);
                out.extend_from_slice(&key[..d]);
                out.push(ids[idx]);
                out.extend(self.dims[d + 1..].iter().map(|ids| ids[0]));
                return Some(Path::new(out));
            }
        }
        None
    }

    /// Row-major dense offset of `path`, or `None` if the path is outside.
    pub fn offset_of(&self, path: &Path) -> Option<u64> {
        if path.dim_count() != self.dims.len() || self.dims.is_empty() {
            return None;
        }
        let mut offset = 0u64;
        for (ids, id) in self.dims.iter().zip(path.iter()) {
            let idx = ids.binary_search(id).ok()?;
            offset = offset * ids.len() as u64 + idx as u64;
        }
        Some(offset)
    }

    /// Inverse of [`Area::offset_of`].
    pub fn path_at(&self, mut offset: u64) -> Option<Path> {
        if offset >= self.size() {
            return None;
        }
        let mut ids = vec![Identifier::new(0); self.dims.len()];
        for d in (0..self.dims.len()).rev() {
            let len = self.dims[d].len() as u64;
            ids[d] = self.dims[d][(offset % len) as usize];
            offset /= len;
        }
        Some(Path::new(ids))
    }

    /// All paths in ascending order.
    pub fn paths(&self) -> AreaPaths<'_> {
        AreaPaths {
            area: self,
            counter: vec![0; self.dims.len()],
            next: self.first_path(),
        }
    }
}

impl TryFrom<Vec<Vec<Identifier>>> for Area {
    type Error = Error;

    fn try_from(dims: Vec<Vec<Identifier>>) -> Result<Self> {
        Area::new(dims)
    }
}

impl From<Area> for Vec<Vec<Identifier>> {
    fn from(area: Area) -> Self {
        area.dims
    }
}

/// Odometer over an area's paths, innermost dimension fastest.
pub struct AreaPaths<'a> {
    area: &'a Area,
    counter: Vec<usize>,
    next: Option<Path>,
}

impl Iterator for AreaPaths<'_> {
    type Item = Path;

    fn next(&mut self) -> Option<Path> {
        let current = self.next.take()?;
        let mut following = current.clone();
        let mut d = self.counter.len();
        while d > 0 {
            d -= 1;
            let ids = self.area.dim(d);
            self.counter[d] += 1;
            if self.counter[d] < ids.len() {
                following.set(d, ids[self.counter[d]]);
                self.next = Some(following);
                return Some(current);
            }
            self.counter[d] = 0;
            following.set(d, ids[0]);
        }
        Some(current)
    }
}
