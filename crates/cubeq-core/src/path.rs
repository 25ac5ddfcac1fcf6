//! Cell coordinates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

use crate::id::Identifier;

/// One coordinate tuple: an identifier per dimension.
///
/// The derived ordering is lexicographic by dimension index, which is the
/// order every stream in the engine emits in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Path(Vec<Identifier>);

/// Shared empty key; streams hand out `&EMPTY_PATH` when unpositioned.
pub static EMPTY_PATH: Path = Path::EMPTY;

impl Path {
    /// The "before start" key reported by unpositioned cursors.
    pub const EMPTY: Path = Path(Vec::new());

    pub fn new(ids: Vec<Identifier>) -> Self {
        Path(ids)
    }

    pub fn from_raw(ids: &[u32]) -> Self {
        Path(ids.iter().copied().map(Identifier::new).collect())
    }

    pub fn dim_count(&self) -> usize {
        self.0.len()
    }

    pub fn ids(&self) -> &[Identifier] {
        &self.0
    }

    pub fn set(&mut self, dim: usize, id: Identifier) {
        self.0[dim] = id;
    }
}

impl Deref for Path {
    type Target = [Identifier];

    fn deref(&self) -> &[Identifier] {
        &self.0
    }
}

impl From<Vec<Identifier>> for Path {
    fn from(ids: Vec<Identifier>) -> Self {
        Path(ids)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", id.get())?;
        }
        f.write_str(")")
    }
}

/// Shorthand used in tests and fixtures: `path![1, 2, 3]`.
#[macro_export]
macro_rules! path {
    ($($id:expr),* $(,)?) => {
        $crate::path::Path::from_raw(&[$($id),*])
    };
}
