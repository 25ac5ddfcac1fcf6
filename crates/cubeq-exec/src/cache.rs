//! Plan-node cache boundary.
//!
//! A cache maps a [`CacheKey`] to a materialized, sorted cell list. The
//! engine consults it for aggregation nodes that name a cache cube and
//! fills it after the first full evaluation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use cubeq_core::aggregation::{AggregationFunction, AggregationMap};
use cubeq_core::area::Area;
use cubeq_core::cell::Cell;
use cubeq_core::error::{Error, Result};
use cubeq_core::hash::{hash_serde, Hash256};
use cubeq_core::id::CubeId;
use cubeq_core::path::{Path, EMPTY_PATH};
use cubeq_operators::{drain, CellStream, CellVecStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(Hash256);

#[derive(Serialize)]
struct KeyParts<'a> {
    cube: CubeId,
    area: &'a Area,
    function: AggregationFunction,
    maps: Option<&'a [AggregationMap]>,
    max_count: u64,
}

impl CacheKey {
    pub fn new(
        cube: CubeId,
        area: &Area,
        function: AggregationFunction,
        maps: Option<&[AggregationMap]>,
        max_count: u64,
    ) -> Result<Self> {
        let parts = KeyParts {
            cube,
            area,
            function,
            maps,
            max_count,
        };
        Ok(Self(hash_serde(&parts)?))
    }

    pub fn hash(&self) -> &Hash256 {
        &self.0
    }
}

pub trait PlanCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Arc<[Cell]>>;
    fn put(&self, key: CacheKey, cells: Arc<[Cell]>);
}

/// Unbounded in-memory cache.
#[derive(Default)]
pub struct MemoryPlanCache {
    entries: Mutex<HashMap<CacheKey, Arc<[Cell]>>>,
}

impl MemoryPlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PlanCache for MemoryPlanCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<[Cell]>> {
        self.entries.lock().get(key).cloned()
    }

    fn put(&self, key: CacheKey, cells: Arc<[Cell]>) {
        self.entries.lock().insert(key, cells);
    }
}

/// Drains `inner` on first use, stores the cells, then serves them.
pub(crate) struct CacheFill {
    inner: Option<Box<dyn CellStream>>,
    cache: Arc<dyn PlanCache>,
    key: CacheKey,
    result: Option<CellVecStream>,
}

impl CacheFill {
    pub(crate) fn new(inner: Box<dyn CellStream>, cache: Arc<dyn PlanCache>, key: CacheKey) -> Self {
        Self {
            inner: Some(inner),
            cache,
            key,
            result: None,
        }
    }

    fn fill(&mut self) -> Result<&mut CellVecStream> {
        if let Some(mut inner) = self.inner.take() {
            let cells: Arc<[Cell]> = drain(inner.as_mut())?.into();
            tracing::trace!(key = %self.key.0, cells = cells.len(), "plan cache store");
            self.cache.put(self.key, Arc::clone(&cells));
            self.result = Some(CellVecStream::new(cells));
        }
        self.result
            .as_mut()
            .ok_or_else(|| Error::Internal("cached stream used after a failed fill".into()))
    }
}

impl CellStream for CacheFill {
    fn next(&mut self) -> Result<bool> {
        self.fill()?.next()
    }

    fn key(&self) -> &Path {
        self.result.as_ref().map_or(&EMPTY_PATH, |r| r.key())
    }

    fn value(&self) -> Result<f64> {
        match &self.result {
            Some(r) => r.value(),
            None => Err(Error::Internal("cached stream value read before next()".into())),
        }
    }

    fn reset(&mut self) {
        match (&mut self.result, &mut self.inner) {
            (Some(r), _) => r.reset(),
            (None, Some(inner)) => inner.reset(),
            (None, None) => {}
        }
    }

    fn seek(&mut self, target: &Path) -> Result<bool> {
        self.fill()?.seek(target)
    }
}
