//! Sequential aggregation operator.
//!
//! Nothing is read until the first `next()`/`seek()`; the whole result is
//! then accumulated on the calling thread and served from memory.

use std::sync::Arc;

use cubeq_core::cell::Cell;
use cubeq_core::error::{Error, Result};
use cubeq_core::path::{Path, EMPTY_PATH};
use cubeq_storage::PageScan;

use crate::materialized::CellVecStream;
use crate::traits::CellStream;

use super::target::{AggregationState, AggregationTarget, ParentExpander};

/// One child of an aggregation.
pub enum AggregationInput {
    /// Raw storage: iterated row by row, duplicates included.
    Scan(PageScan),
    Stream(Box<dyn CellStream>),
}

impl AggregationInput {
    /// Feed every row of this input into `state`.
    pub fn accumulate_into(
        &mut self,
        target: &AggregationTarget,
        state: &mut AggregationState,
        expander: &mut ParentExpander,
    ) -> Result<()> {
        match self {
            AggregationInput::Scan(scan) => {
                while scan.next()? {
                    target.accumulate(state, expander, scan.key(), scan.value()?)?;
                }
            }
            AggregationInput::Stream(stream) => {
                while stream.next()? {
                    target.accumulate(state, expander, stream.key(), stream.value()?)?;
                }
            }
        }
        Ok(())
    }

    pub fn is_scan(&self) -> bool {
        matches!(self, AggregationInput::Scan(_))
    }
}

pub struct AggregationProcessor {
    target: Arc<AggregationTarget>,
    inputs: Vec<AggregationInput>,
    result: Option<CellVecStream>,
    // Inputs are partly consumed after a failure, so it is final.
    failed: Option<Error>,
}

impl AggregationProcessor {
    pub fn new(target: Arc<AggregationTarget>, inputs: Vec<AggregationInput>) -> Self {
        Self {
            target,
            inputs,
            result: None,
            failed: None,
        }
    }

    fn evaluate(&mut self) -> Result<&mut CellVecStream> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if self.result.is_none() {
            match self.aggregate() {
                Ok(cells) => self.result = Some(CellVecStream::new(cells)),
                Err(err) => {
                    self.failed = Some(err.clone());
                    return Err(err);
                }
            }
        }
        self.result
            .as_mut()
            .ok_or_else(|| Error::Internal("aggregation result missing after evaluation".into()))
    }

    fn aggregate(&mut self) -> Result<Vec<Cell>> {
        let mut state = AggregationState::default();
        let mut expander = self.target.expander();
        for input in &mut self.inputs {
            input.accumulate_into(&self.target, &mut state, &mut expander)?;
        }
        let contributions = state.contributions();
        let cells = self.target.finish(state)?;
        tracing::debug!(
            cells = cells.len(),
            contributions,
            function = ?self.target.function(),
            "aggregated area"
        );
        Ok(cells)
    }
}

impl CellStream for AggregationProcessor {
    fn next(&mut self) -> Result<bool> {
        self.evaluate()?.next()
    }

    fn key(&self) -> &Path {
        self.result.as_ref().map_or(&EMPTY_PATH, |r| r.key())
    }

    fn value(&self) -> Result<f64> {
        match &self.result {
            Some(r) => r.value(),
            None => Err(Error::Internal(
                "aggregation value read before a successful next()".into(),
            )),
        }
    }

    fn reset(&mut self) {
        if let Some(r) = &mut self.result {
            r.reset();
        }
    }

    fn seek(&mut self, target: &Path) -> Result<bool> {
        self.evaluate()?.seek(target)
    }
}
