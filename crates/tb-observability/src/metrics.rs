//! Metrics collection for the provisioning pipeline.
//!
//! Counters and histograms via the `metrics` crate; an exporter is wired up
//! by the embedding application, not here.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::sync::Once;

static REGISTER: Once = Once::new();

const ROWS_PROCESSED: &str = "tb_rows_processed_total";
const ROWS_FAILED: &str = "tb_rows_failed_total";
const COMPENSATIONS: &str = "tb_compensations_total";
const BATCH_DURATION: &str = "tb_batch_duration_seconds";

/// Recorder for pipeline-level metrics.
#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics;

impl PipelineMetrics {
    pub fn new() -> Self {
        REGISTER.call_once(|| {
            describe_counter!(ROWS_PROCESSED, "Rows fully provisioned");
            describe_counter!(ROWS_FAILED, "Rows failed, labeled by pipeline stage");
            describe_counter!(COMPENSATIONS, "Compensation sequences run, labeled by scope");
            describe_histogram!(BATCH_DURATION, "Wall-clock duration of one batch run");
        });
        Self
    }

    /// Records one successfully provisioned row.
    pub fn row_processed(&self) {
        counter!(ROWS_PROCESSED).increment(1);
    }

    /// Records one failed row, labeled by the stage that failed.
    pub fn row_failed(&self, stage: &str) {
        counter!(ROWS_FAILED, "stage" => stage.to_string()).increment(1);
    }

    /// Records one compensation sequence.
    pub fn compensation_run(&self, scope: &str) {
        counter!(COMPENSATIONS, "scope" => scope.to_string()).increment(1);
    }

    /// Records the duration of a finished batch.
    pub fn batch_finished(&self, seconds: f64) {
        histogram!(BATCH_DURATION).record(seconds);
    }
}
