//! Owning registry of cube storages.
//!
//! Plan nodes name cubes by [`CubeId`]; the registry is the only owner of
//! the storage handles and resolves ids on demand.

use std::sync::Arc;

use cubeq_core::error::{Error, Result};
use cubeq_core::id::CubeId;

use crate::storage::CellStorage;

#[derive(Default)]
pub struct CubeRegistry {
    cubes: Vec<Arc<dyn CellStorage>>,
}

impl CubeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, storage: Arc<dyn CellStorage>) -> CubeId {
        self.cubes.push(storage);
        CubeId::new((self.cubes.len() - 1) as u64)
    }

    pub fn get(&self, id: CubeId) -> Result<&Arc<dyn CellStorage>> {
        usize::try_from(id.get())
            .ok()
            .and_then(|idx| self.cubes.get(idx))
            .ok_or_else(|| Error::Plan(format!("unknown cube {id}")))
    }

    pub fn len(&self) -> usize {
        self.cubes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cubes.is_empty()
    }
}
