//! Engine: turns a plan tree into a cell stream.

use std::sync::Arc;

use cubeq_core::area::Area;
use cubeq_core::cell::Cell;
use cubeq_core::config::EngineConfig;
use cubeq_core::error::{Error, Result};
use cubeq_core::id::CubeId;
use cubeq_core::plan::PlanNode;
use cubeq_operators::{
    drain, AggregationInput, AggregationProcessor, AggregationTarget, CellStream, CellVecStream,
    CombinationProcessor, ConstantStream, DisjunctiveCombinationProcessor, SourceStream,
};
use cubeq_storage::{CellStorage, CubeRegistry, PageScan};

use crate::cache::{CacheFill, CacheKey, PlanCache};
use crate::parallel::ParallelAggregation;
use crate::pool::ThreadPool;

pub struct Engine {
    cfg: EngineConfig,
    cubes: CubeRegistry,
    pool: Option<ThreadPool>,
    cache: Option<Arc<dyn PlanCache>>,
}

impl Engine {
    pub fn new(cfg: EngineConfig) -> Result<Self> {
        cfg.validate()?;
        let pool = if cfg.is_parallel() {
            Some(ThreadPool::new(cfg.worker_threads)?)
        } else {
            None
        };
        tracing::debug!(workers = cfg.worker_threads, "engine started");
        Ok(Self {
            cfg,
            cubes: CubeRegistry::new(),
            pool,
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: Arc<dyn PlanCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn register_cube(&mut self, storage: Arc<dyn CellStorage>) -> CubeId {
        self.cubes.register(storage)
    }

    /// Validate `plan` and build its stream. Nothing is read until the
    /// stream is pulled.
    pub fn create_stream(&self, plan: &PlanNode) -> Result<Box<dyn CellStream>> {
        plan.validate()?;
        self.build(plan)
    }

    pub fn materialize(&self, plan: &PlanNode) -> Result<Vec<Cell>> {
        let mut stream = self.create_stream(plan)?;
        drain(stream.as_mut())
    }

    fn build(&self, plan: &PlanNode) -> Result<Box<dyn CellStream>> {
        match plan {
            PlanNode::Source { cube, area } => {
                let scan = self.scan(*cube, area)?;
                Ok(Box::new(SourceStream::new(scan)))
            }
            PlanNode::Constant { area, value } => {
                Ok(Box::new(ConstantStream::new(Arc::clone(area), *value)))
            }
            PlanNode::Aggregation {
                area,
                children,
                function,
                maps,
                max_count,
                cache,
            } => {
                let max_count = match *max_count {
                    0 => self.cfg.max_result_count,
                    n => n,
                };
                let cache_key = match (cache, &self.cache) {
                    (Some(cube), Some(plan_cache)) => {
                        let maps = maps.as_deref().map(Vec::as_slice);
                        let key = CacheKey::new(*cube, area, *function, maps, max_count)?;
                        if let Some(cells) = plan_cache.get(&key) {
                            tracing::trace!(key = %key.hash(), cells = cells.len(), "plan cache hit");
                            return Ok(Box::new(CellVecStream::new(cells)));
                        }
                        Some((key, Arc::clone(plan_cache)))
                    }
                    _ => None,
                };

                let target = Arc::new(
                    AggregationTarget::new(Arc::clone(area), *function)
                        .with_maps(maps.clone())
                        .with_max_count(max_count)
                        .with_hash_threshold(self.cfg.hash_threshold),
                );
                let inputs = children
                    .iter()
                    .map(|child| -> Result<AggregationInput> {
                        Ok(match child {
                            PlanNode::Source { cube, area } => {
                                AggregationInput::Scan(self.scan(*cube, area)?)
                            }
                            other => AggregationInput::Stream(self.build(other)?),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                let stream: Box<dyn CellStream> = match &self.pool {
                    Some(pool)
                        if function.is_parallel_safe()
                            && inputs.iter().any(AggregationInput::is_scan)
                            && area.size() >= self.cfg.parallel_threshold =>
                    {
                        Box::new(ParallelAggregation::new(
                            target,
                            inputs,
                            pool.handle(),
                            self.cfg.split_page_multiple,
                        ))
                    }
                    _ => Box::new(AggregationProcessor::new(target, inputs)),
                };

                Ok(match cache_key {
                    Some((key, plan_cache)) => Box::new(CacheFill::new(stream, plan_cache, key)),
                    None => stream,
                })
            }
            PlanNode::Combination { children, .. } => {
                let children = children
                    .iter()
                    .map(|child| self.build(child))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Box::new(CombinationProcessor::new(children)))
            }
            PlanNode::DisjunctiveCombination { area, children } => {
                let children = children
                    .iter()
                    .map(|child| -> Result<(Arc<Area>, Box<dyn CellStream>)> {
                        Ok((Arc::clone(child.area()), self.build(child)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Box::new(DisjunctiveCombinationProcessor::new(area, children)?))
            }
        }
    }

    fn scan(&self, cube: CubeId, area: &Arc<Area>) -> Result<PageScan> {
        let storage = self.cubes.get(cube)?;
        if storage.dim_count() != area.dim_count() {
            return Err(Error::Plan(format!(
                "source over {cube} selects {} dimensions, cube has {}",
                area.dim_count(),
                storage.dim_count()
            )));
        }
        Ok(PageScan::new(Arc::clone(storage), Arc::clone(area)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubeq_core::aggregation::{AggregationFunction, AggregationMap};
    use cubeq_core::path;
    use cubeq_storage::MemoryStorage;

    fn engine_with(rows: &[(&[u32], f64)]) -> (Engine, CubeId) {
        let mut engine = Engine::new(EngineConfig::sequential()).unwrap();
        let cube = engine.register_cube(Arc::new(MemoryStorage::from_rows(2, 2, rows).unwrap()));
        (engine, cube)
    }

    fn area(dims: Vec<Vec<u32>>) -> Area {
        Area::from_ids(dims).unwrap()
    }

    #[test]
    fn source_dimension_mismatch_is_a_plan_error() {
        let (engine, cube) = engine_with(&[]);
        let plan = PlanNode::source(cube, area(vec![vec![1]]));
        assert!(matches!(engine.create_stream(&plan), Err(Error::Plan(_))));

        let unknown = PlanNode::source(CubeId::new(7), area(vec![vec![1], vec![1]]));
        assert!(matches!(engine.create_stream(&unknown), Err(Error::Plan(_))));
    }

    #[test]
    fn aggregation_through_maps_rolls_up() {
        let (engine, cube) = engine_with(&[(&[1, 1], 2.0), (&[2, 1], 4.0), (&[3, 1], 8.0)]);
        let maps = vec![
            AggregationMap::identity().with(1, 10, 1.0).with(2, 10, 0.5),
            AggregationMap::identity(),
        ];
        let plan = PlanNode::Aggregation {
            area: Arc::new(area(vec![vec![3, 10], vec![1]])),
            children: vec![PlanNode::source(cube, area(vec![vec![1, 2, 3], vec![1]]))],
            function: AggregationFunction::Sum,
            maps: Some(Arc::new(maps)),
            max_count: 0,
            cache: None,
        };
        let cells = engine.materialize(&plan).unwrap();
        assert_eq!(
            cells,
            vec![Cell::new(path![3, 1], 8.0), Cell::new(path![10, 1], 4.0)]
        );
    }

    #[test]
    fn nested_plan_combines_aggregate_with_constant() {
        let (engine, cube) = engine_with(&[(&[1, 1], 2.0), (&[1, 1], 3.0)]);
        let target = area(vec![vec![1, 2], vec![1]]);
        let plan = PlanNode::combination(
            target.clone(),
            vec![
                PlanNode::sum(target.clone(), vec![PlanNode::source(cube, target.clone())]),
                PlanNode::constant(target, 0.0),
            ],
        );
        let cells = engine.materialize(&plan).unwrap();
        assert_eq!(
            cells,
            vec![Cell::new(path![1, 1], 5.0), Cell::new(path![2, 1], 0.0)]
        );
    }
}
