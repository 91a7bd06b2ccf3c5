//! Structured stage logging.
//!
//! Keeps cache hit/miss/store/failure messages consistent across stages so
//! log queries can filter on `key` and `stage`.

use tracing::{debug, error, info, warn, Span};

use reel_models::{Stage, VideoKey};

/// Logger bound to one `(video, stage)` pair.
#[derive(Debug, Clone)]
pub struct StageLogger {
    key: String,
    stage: Stage,
    /// Sub-unit within the stage (highlight rank for crop)
    unit: Option<u32>,
}

impl StageLogger {
    pub fn new(key: &VideoKey, stage: Stage) -> Self {
        Self {
            key: key.to_string(),
            stage,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: Option<u32>) -> Self {
        self.unit = unit;
        self
    }

    pub fn log_hit(&self, after_wait: bool) {
        info!(
            key = %self.key,
            stage = %self.stage,
            unit = ?self.unit,
            after_wait,
            "Stage cache HIT"
        );
    }

    pub fn log_miss(&self) {
        info!(key = %self.key, stage = %self.stage, unit = ?self.unit, "Stage cache MISS, producing");
    }

    pub fn log_stale(&self, reason: &str) {
        debug!(
            key = %self.key,
            stage = %self.stage,
            unit = ?self.unit,
            reason = %reason,
            "Stored stage result not reusable"
        );
    }

    pub fn log_rejected(&self, reason: &str) {
        warn!(
            key = %self.key,
            stage = %self.stage,
            unit = ?self.unit,
            reason = %reason,
            "Producer output rejected, nothing stored"
        );
    }

    pub fn log_stored(&self, elapsed_secs: f64) {
        info!(
            key = %self.key,
            stage = %self.stage,
            unit = ?self.unit,
            elapsed_secs,
            "Stage result stored"
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(key = %self.key, stage = %self.stage, unit = ?self.unit, "Stage failed: {}", message);
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Span covering one get-or-compute call.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("stage", key = %self.key, stage = %self.stage, unit = ?self.unit)
    }
}
