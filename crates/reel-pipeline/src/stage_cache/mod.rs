//! Stage cache: get-or-compute for every pipeline stage.
//!
//! Each stage follows the same protocol:
//!
//! 1. Look up the stored result and check it with the stage's validity
//!    predicate. A valid result is returned without running the producer.
//! 2. Otherwise take the `(stage, key[, rank])` lock and look again, since a
//!    concurrent caller may have committed in the meantime.
//! 3. Run the producer, validate its output and write it as one unit.
//!
//! Producer and store errors are returned unchanged. Invalid producer output
//! fails with [`PipelineError::StageProductionFailed`] and writes nothing.

mod locks;
mod stages;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{info, Instrument};

use reel_models::{
    validate_highlight_set, HighlightCandidate, HighlightRecord, RawTranscript, StageStatus,
    TranscriptionRecord, VideoKey, VideoRecord, VideoSource,
};
use reel_store::VideoStore;

use crate::error::{PipelineError, PipelineResult};
use crate::logging::StageLogger;
use crate::metrics;

use locks::{KeyedLocks, LockId};
use stages::{CacheableStage, CropStage, DownloadStage, HighlightStage, Lookup, TranscribeStage};

/// A stage result, hit or freshly produced.
#[derive(Debug, Clone)]
pub struct StageOutput<T> {
    pub value: T,
    /// `true` when the stored result was reused and no producer ran.
    pub cache_hit: bool,
}

impl<T> StageOutput<T> {
    fn hit(value: T) -> Self {
        Self {
            value,
            cache_hit: true,
        }
    }

    fn produced(value: T) -> Self {
        Self {
            value,
            cache_hit: false,
        }
    }
}

/// Memoizes stage results in a [`VideoStore`].
#[derive(Debug, Clone)]
pub struct StageCache {
    store: VideoStore,
    locks: KeyedLocks,
}

impl StageCache {
    pub fn new(store: VideoStore) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    pub fn store(&self) -> &VideoStore {
        &self.store
    }

    /// Local media file for `key`, downloading it on a miss.
    ///
    /// A video row without a usable local file counts as a miss.
    pub async fn download<F, Fut>(
        &self,
        key: &VideoKey,
        source: &VideoSource,
        produce: F,
    ) -> PipelineResult<StageOutput<VideoRecord>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PipelineResult<PathBuf>>,
    {
        self.get_or_compute(&DownloadStage { source }, key, produce).await
    }

    pub async fn transcribe<F, Fut>(
        &self,
        key: &VideoKey,
        produce: F,
    ) -> PipelineResult<StageOutput<TranscriptionRecord>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PipelineResult<RawTranscript>>,
    {
        self.get_or_compute(&TranscribeStage, key, produce).await
    }

    /// Highlight set for `key`, ordered by start.
    ///
    /// An empty or inconsistent stored set counts as a miss.
    pub async fn highlights<F, Fut>(
        &self,
        key: &VideoKey,
        produce: F,
    ) -> PipelineResult<StageOutput<Vec<HighlightRecord>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PipelineResult<Vec<HighlightCandidate>>>,
    {
        self.get_or_compute(&HighlightStage, key, produce).await
    }

    /// Rendered clip for highlight `rank`; the highlight must already be stored.
    pub async fn crop<F, Fut>(
        &self,
        key: &VideoKey,
        rank: u32,
        produce: F,
    ) -> PipelineResult<StageOutput<HighlightRecord>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PipelineResult<PathBuf>>,
    {
        self.get_or_compute(&CropStage { rank }, key, produce).await
    }

    /// Delete every record of `key`. Returns whether anything was stored.
    pub fn reset(&self, key: &VideoKey) -> PipelineResult<bool> {
        let deleted = self.store.delete_video(key)?;
        info!(key = %key, deleted, "Reset stage cache");
        Ok(deleted)
    }

    /// Which stages currently hold a usable result for `key`.
    pub fn status(&self, key: &VideoKey) -> PipelineResult<StageStatus> {
        let downloaded = self
            .store
            .get_video(key)?
            .is_some_and(|v| v.usable_local_file().is_some());
        let transcribed = self.store.get_transcription(key)?.is_some();

        let highlights = self.store.get_highlights(key)?;
        let valid = validate_highlight_set(highlights.iter().map(|h| (h.start, h.end))).is_ok();

        Ok(StageStatus {
            downloaded,
            transcribed,
            highlights: if valid { highlights.len() } else { 0 },
            cropped: highlights
                .iter()
                .filter(|h| h.usable_clip().is_some())
                .count(),
        })
    }

    async fn get_or_compute<S, F, Fut>(
        &self,
        stage: &S,
        key: &VideoKey,
        produce: F,
    ) -> PipelineResult<StageOutput<S::Output>>
    where
        S: CacheableStage,
        F: FnOnce() -> Fut,
        Fut: Future<Output = PipelineResult<S::Raw>>,
    {
        let logger = StageLogger::new(key, S::STAGE).with_unit(stage.unit());
        let span = logger.create_span();

        let result = self
            .run_stage(stage, key, produce, &logger)
            .instrument(span)
            .await;

        if let Err(e) = &result {
            metrics::record_stage_failure(S::STAGE, e.kind());
            logger.log_error(&e.to_string());
        }
        result
    }

    async fn run_stage<S, F, Fut>(
        &self,
        stage: &S,
        key: &VideoKey,
        produce: F,
        logger: &StageLogger,
    ) -> PipelineResult<StageOutput<S::Output>>
    where
        S: CacheableStage,
        F: FnOnce() -> Fut,
        Fut: Future<Output = PipelineResult<S::Raw>>,
    {
        stage.prepare(&self.store, key)?;

        if let Some(value) = self.check(stage, key, logger)? {
            logger.log_hit(false);
            metrics::record_cache_hit(S::STAGE);
            return Ok(StageOutput::hit(value));
        }

        let _lock = self
            .locks
            .acquire(LockId::new(S::STAGE, key, stage.unit()))
            .await;

        // Another caller may have committed while we waited
        if let Some(value) = self.check(stage, key, logger)? {
            logger.log_hit(true);
            metrics::record_cache_hit(S::STAGE);
            return Ok(StageOutput::hit(value));
        }

        logger.log_miss();
        metrics::record_cache_miss(S::STAGE);
        let started = Instant::now();

        let mut raw = produce().await?;
        if let Err(reason) = stage.validate(&mut raw) {
            logger.log_rejected(&reason);
            return Err(PipelineError::production_failed(S::STAGE, key.as_str(), reason));
        }
        let value = stage.commit(&self.store, key, raw)?;

        let elapsed = started.elapsed().as_secs_f64();
        metrics::record_stage_duration(S::STAGE, elapsed);
        logger.log_stored(elapsed);

        Ok(StageOutput::produced(value))
    }

    fn check<S: CacheableStage>(
        &self,
        stage: &S,
        key: &VideoKey,
        logger: &StageLogger,
    ) -> PipelineResult<Option<S::Output>> {
        match stage.lookup(&self.store, key)? {
            Lookup::Hit(value) => Ok(Some(value)),
            Lookup::Stale(reason) => {
                logger.log_stale(&reason);
                Ok(None)
            }
            Lookup::Missing => Ok(None),
        }
    }
}
