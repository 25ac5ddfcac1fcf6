//! Parallel SUM aggregation with dynamic, page-aligned work splitting.
//!
//! The calling thread scans its inputs like the sequential operator, but
//! every time a scan enters a new page it may hand the tail of its range to
//! a new pool job:
//!
//! - the next page whose split-depth prefix changes (the jump) lies inside
//!   the range,
//! - more than `max_page_rows * split_page_multiple` rows separate the
//!   current page from the jump,
//! - the selection does not pin the split dimension,
//! - the pool reports a free core.
//!
//! Jobs apply the same rule to their own ranges. Each job accumulates
//! privately and, when done, moves its state into a shared slot under a
//! mutex (the first arrival is adopted, later ones are folded in). The
//! caller joins the group, folds the slot into its own state, and serves
//! the result from memory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use cubeq_core::error::{Error, Result};
use cubeq_core::path::{Path, EMPTY_PATH};
use cubeq_operators::aggregate::{AggregationState, AggregationTarget, ParentExpander};
use cubeq_operators::{AggregationInput, CellStream, CellVecStream};
use cubeq_storage::PageScan;

use crate::metrics::AggregationStats;
use crate::pool::{PoolHandle, ThreadGroup};

struct SplitContext {
    target: Arc<AggregationTarget>,
    pool: PoolHandle,
    group: ThreadGroup,
    split_page_multiple: u64,
    shared: Mutex<Option<AggregationState>>,
    jobs: AtomicU64,
    rows: AtomicU64,
}

impl SplitContext {
    fn scan(
        self: &Arc<Self>,
        scan: &mut PageScan,
        state: &mut AggregationState,
        expander: &mut ParentExpander,
    ) -> Result<()> {
        let before = scan.rows_read();
        let outcome = (|| {
            while scan.next()? {
                if scan.take_page_entered() {
                    self.maybe_split(scan)?;
                }
                self.target
                    .accumulate(state, expander, scan.key(), scan.value()?)?;
            }
            Ok(())
        })();
        self.rows
            .fetch_add(scan.rows_read() - before, Ordering::Relaxed);
        outcome
    }

    // Yield point, checked once per page.
    fn maybe_split(self: &Arc<Self>, scan: &mut PageScan) -> Result<()> {
        if scan.split_depth().is_none() {
            return Ok(());
        }
        let Some(jump) = scan.jump()? else {
            return Ok(());
        };
        let min_jump = scan.storage().max_page_rows() as u64 * self.split_page_multiple;
        if jump >= scan.end_page()
            || scan.rows_between(scan.current_page(), jump) <= min_jump
            || !self.pool.has_free_core()
        {
            return Ok(());
        }

        let tail = scan.split_off(jump)?;
        tracing::trace!(
            start = jump,
            end = tail.end_page(),
            "handing off scan range"
        );
        self.spawn(tail);
        Ok(())
    }

    fn spawn(self: &Arc<Self>, scan: PageScan) {
        self.jobs.fetch_add(1, Ordering::Relaxed);
        let ctx = Arc::clone(self);
        self.pool.submit(&self.group, move || ctx.run_job(scan));
    }

    fn run_job(self: Arc<Self>, mut scan: PageScan) -> Result<()> {
        let mut state = AggregationState::default();
        let mut expander = self.target.expander();
        self.scan(&mut scan, &mut state, &mut expander)?;
        self.deposit(state)
    }

    fn deposit(&self, state: AggregationState) -> Result<()> {
        let mut slot = self.shared.lock();
        if let Some(shared) = slot.as_mut() {
            return self.target.merge(shared, state);
        }
        *slot = Some(state);
        Ok(())
    }
}

pub struct ParallelAggregation {
    target: Arc<AggregationTarget>,
    inputs: Vec<AggregationInput>,
    pool: PoolHandle,
    split_page_multiple: u64,
    result: Option<CellVecStream>,
    stats: Option<AggregationStats>,
    // Scan tails were handed to jobs that are gone; a failed run cannot resume.
    failed: Option<Error>,
}

impl ParallelAggregation {
    pub fn new(
        target: Arc<AggregationTarget>,
        inputs: Vec<AggregationInput>,
        pool: PoolHandle,
        split_page_multiple: u64,
    ) -> Self {
        Self {
            target,
            inputs,
            pool,
            split_page_multiple,
            result: None,
            stats: None,
            failed: None,
        }
    }

    /// Counters of the finished evaluation, if it has run.
    pub fn stats(&self) -> Option<AggregationStats> {
        self.stats
    }

    fn evaluate(&mut self) -> Result<&mut CellVecStream> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if self.result.is_none() {
            match self.aggregate() {
                Ok(cells) => self.result = Some(CellVecStream::new(cells)),
                Err(err) => {
                    tracing::debug!(error = %err, "parallel aggregation failed");
                    self.failed = Some(err.clone());
                    return Err(err);
                }
            }
        }
        self.result
            .as_mut()
            .ok_or_else(|| Error::Internal("aggregation result missing after evaluation".into()))
    }

    fn aggregate(&mut self) -> Result<Vec<cubeq_core::cell::Cell>> {
        let ctx = Arc::new(SplitContext {
            target: Arc::clone(&self.target),
            pool: self.pool.clone(),
            group: self.pool.create_group(),
            split_page_multiple: self.split_page_multiple,
            shared: Mutex::new(None),
            jobs: AtomicU64::new(0),
            rows: AtomicU64::new(0),
        });

        let mut state = AggregationState::default();
        let mut expander = self.target.expander();
        let mut outcome = Ok(());
        for input in &mut self.inputs {
            outcome = match input {
                AggregationInput::Scan(scan) => ctx.scan(scan, &mut state, &mut expander),
                other => other.accumulate_into(&self.target, &mut state, &mut expander),
            };
            if outcome.is_err() {
                break;
            }
        }

        // Spawned jobs always run to completion, even when this thread failed.
        let joined = self.pool.join(&ctx.group);
        outcome?;
        joined?;

        if let Some(partial) = ctx.shared.lock().take() {
            self.target.merge(&mut state, partial)?;
        }

        let contributions = state.contributions();
        let cells = self.target.finish(state)?;
        let stats = AggregationStats {
            rows_scanned: ctx.rows.load(Ordering::Relaxed),
            contributions,
            jobs_spawned: ctx.jobs.load(Ordering::Relaxed),
            result_cells: cells.len() as u64,
        };
        tracing::debug!(
            cells = stats.result_cells,
            contributions,
            jobs = stats.jobs_spawned,
            "aggregated area in parallel"
        );
        stats.emit();
        self.stats = Some(stats);
        Ok(cells)
    }
}

impl CellStream for ParallelAggregation {
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
