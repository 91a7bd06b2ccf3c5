//! Pipeline metrics.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use reel_models::Stage;

use crate::error::{PipelineError, PipelineResult};

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_prometheus(addr: SocketAddr) -> PipelineResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| PipelineError::config(format!("failed to start metrics exporter: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    pub const STAGE_CACHE_HITS_TOTAL: &str = "reel_stage_cache_hits_total";
    pub const STAGE_CACHE_MISSES_TOTAL: &str = "reel_stage_cache_misses_total";
    pub const STAGE_FAILURES_TOTAL: &str = "reel_stage_failures_total";
    pub const STAGE_DURATION_SECONDS: &str = "reel_stage_duration_seconds";
    pub const PIPELINE_RUNS_TOTAL: &str = "reel_pipeline_runs_total";
}

pub fn record_cache_hit(stage: Stage) {
    let labels = [("stage", stage.as_str().to_string())];
    counter!(names::STAGE_CACHE_HITS_TOTAL, &labels).increment(1);
}

pub fn record_cache_miss(stage: Stage) {
    let labels = [("stage", stage.as_str().to_string())];
    counter!(names::STAGE_CACHE_MISSES_TOTAL, &labels).increment(1);
}

pub fn record_stage_failure(stage: Stage, kind: &str) {
    let labels = [
        ("stage", stage.as_str().to_string()),
        ("kind", kind.to_string()),
    ];
    counter!(names::STAGE_FAILURES_TOTAL, &labels).increment(1);
}

/// Time spent producing and storing a stage result (misses only).
pub fn record_stage_duration(stage: Stage, duration_secs: f64) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_pipeline_run(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::PIPELINE_RUNS_TOTAL, &labels).increment(1);
}
