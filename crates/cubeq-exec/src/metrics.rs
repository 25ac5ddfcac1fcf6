//! Metrics/tracing hooks.
//!
//! Only `tracing` events are emitted here; installing a subscriber or
//! exporting to a metrics backend is left to the binary.

pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let span = tracing::span!(tracing::Level::TRACE, "cubeq", event);
    let _entered = span.enter();
    for (k, v) in key_values {
        tracing::trace!(%event, %k, %v, "metric");
    }
}

/// Counters collected by one aggregation evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationStats {
    /// Raw rows read from storage scans (all workers).
    pub rows_scanned: u64,
    /// Contributions folded into accumulators, including non-scan inputs.
    pub contributions: u64,
    pub jobs_spawned: u64,
    pub result_cells: u64,
}

impl AggregationStats {
    pub fn emit(&self) {
        emit_span(
            "aggregation",
            &[
                ("rows_scanned", self.rows_scanned.to_string()),
                ("contributions", self.contributions.to_string()),
                ("jobs_spawned", self.jobs_spawned.to_string()),
                ("result_cells", self.result_cells.to_string()),
            ],
        );
    }
}
