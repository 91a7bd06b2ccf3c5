//! Pipeline driver: download, transcribe, extract highlights and crop one
//! video, consulting the stage cache before each stage.

use std::fmt;
use std::path::Path;

use tracing::{error, info, warn};

use reel_models::{
    HighlightRecord, IdentityResolver, Stage, StageStatus, TranscriptionRecord, VideoKey,
    VideoRecord, VideoSource,
};

use crate::error::PipelineError;
use crate::metrics;
use crate::producers::{CropRequest, Producers};
use crate::stage_cache::StageCache;

/// Error surfaced to the caller: which stage failed, for which video.
#[derive(Debug)]
pub struct PipelineFailure {
    /// `None` when the source could not be resolved or opened.
    pub stage: Option<Stage>,
    pub key: Option<VideoKey>,
    pub error: PipelineError,
}

impl PipelineFailure {
    fn at(stage: Stage, key: &VideoKey, error: PipelineError) -> Self {
        Self {
            stage: Some(stage),
            key: Some(key.clone()),
            error,
        }
    }

    fn unresolved(error: PipelineError) -> Self {
        Self {
            stage: None,
            key: None,
            error,
        }
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.stage, &self.key) {
            (Some(stage), Some(key)) => write!(f, "{} stage failed for {}: {}", stage, key, self.error),
            (None, Some(key)) => write!(f, "pipeline failed for {}: {}", key, self.error),
            _ => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub key: VideoKey,
    pub video: VideoRecord,
    pub transcription: TranscriptionRecord,
    /// Every stored highlight, ordered by start.
    pub highlights: Vec<HighlightRecord>,
    /// Highlights cropped in this run, by rank.
    pub clips: Vec<HighlightRecord>,
    /// Whether each stage call was served from the cache, in call order.
    pub cache_hits: Vec<(Stage, bool)>,
}

impl PipelineReport {
    pub fn clip_paths(&self) -> Vec<&Path> {
        self.clips.iter().filter_map(|c| c.clip_path.as_deref()).collect()
    }

    /// No producer ran during this run.
    pub fn fully_cached(&self) -> bool {
        self.cache_hits.iter().all(|(_, hit)| *hit)
    }
}

/// Runs one video start to finish.
pub struct Pipeline<P> {
    cache: StageCache,
    producers: P,
    resolver: IdentityResolver,
    max_clips: usize,
}

impl<P: Producers> Pipeline<P> {
    pub fn new(cache: StageCache, producers: P) -> Self {
        Self {
            cache,
            producers,
            resolver: IdentityResolver::new(),
            max_clips: 1,
        }
    }

    pub fn with_resolver(mut self, resolver: IdentityResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Crop this many top-ranked highlights per run.
    pub fn with_max_clips(mut self, max_clips: usize) -> Self {
        self.max_clips = max_clips;
        self
    }

    pub fn cache(&self) -> &StageCache {
        &self.cache
    }

    /// Process `input` (URL or local path). Halts at the first failing stage.
    pub async fn run(&self, input: &str) -> Result<PipelineReport, PipelineFailure> {
        let result = self.run_inner(input).await;

        match &result {
            Ok(report) => {
                metrics::record_pipeline_run("completed");
                info!(
                    key = %report.key,
                    highlights = report.highlights.len(),
                    clips = report.clips.len(),
                    fully_cached = report.fully_cached(),
                    "Pipeline completed"
                );
            }
            Err(failure) => {
                metrics::record_pipeline_run("failed");
                error!(
                    stage = ?failure.stage,
                    key = ?failure.key.as_ref().map(VideoKey::as_str),
                    error_kind = failure.error.kind(),
                    "Pipeline halted: {}",
                    failure.error
                );
            }
        }
        result
    }

    async fn run_inner(&self, input: &str) -> Result<PipelineReport, PipelineFailure> {
        let (source, key) = self.resolve(input)?;
        info!(key = %key, source = %source.reference(), "Processing video");

        let mut cache_hits = Vec::new();

        let video = self
            .cache
            .download(&key, &source, || self.producers.download(&source, &key))
            .await
            .map_err(|e| PipelineFailure::at(Stage::Download, &key, e))?;
        cache_hits.push((Stage::Download, video.cache_hit));
        let video = video.value;

        let media = video
            .usable_local_file()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                PipelineFailure::at(
                    Stage::Download,
                    &key,
                    PipelineError::download_failed("no local file recorded"),
                )
            })?;

        let transcription = self
            .cache
            .transcribe(&key, || self.producers.transcribe(&media, &key))
            .await
            .map_err(|e| PipelineFailure::at(Stage::Transcribe, &key, e))?;
        cache_hits.push((Stage::Transcribe, transcription.cache_hit));
        let transcription = transcription.value;

        let highlights = self
            .cache
            .highlights(&key, || {
                self.producers
                    .extract_highlights(&transcription.text, &transcription.segments)
            })
            .await
            .map_err(|e| PipelineFailure::at(Stage::Highlights, &key, e))?;
        cache_hits.push((Stage::Highlights, highlights.cache_hit));
        let highlights = highlights.value;

        let mut by_rank: Vec<&HighlightRecord> = highlights.iter().collect();
        by_rank.sort_by_key(|h| h.rank);

        // A zero-length range is a valid highlight but has nothing to render
        let (by_rank, instants): (Vec<_>, Vec<_>) =
            by_rank.into_iter().partition(|h| h.end > h.start);
        for highlight in instants {
            warn!(
                key = %key,
                rank = highlight.rank,
                start = highlight.start,
                "Skipping crop of zero-length highlight"
            );
        }

        let mut clips = Vec::new();
        for highlight in by_rank.into_iter().take(self.max_clips) {
            let request = CropRequest {
                media: &media,
                key: &key,
                rank: highlight.rank,
                start: highlight.start,
                end: highlight.end,
            };
            let clip = self
                .cache
                .crop(&key, highlight.rank, || self.producers.crop_vertical(request))
                .await
                .map_err(|e| PipelineFailure::at(Stage::Crop, &key, e))?;
            cache_hits.push((Stage::Crop, clip.cache_hit));
            clips.push(clip.value);
        }

        // Reflect clip paths written in this run
        let highlights = self
            .cache
            .store()
            .get_highlights(&key)
            .map_err(|e| PipelineFailure::at(Stage::Crop, &key, e.into()))?;

        Ok(PipelineReport {
            key,
            video,
            transcription,
            highlights,
            clips,
            cache_hits,
        })
    }

    /// Resolve `input` to its source and identity key.
    pub fn resolve(&self, input: &str) -> Result<(VideoSource, VideoKey), PipelineFailure> {
        self.resolver
            .resolve_input(input)
            .map_err(|e| PipelineFailure::unresolved(e.into()))
    }

    /// Stage completion for `input`.
    pub fn status(&self, input: &str) -> Result<(VideoKey, StageStatus), PipelineFailure> {
        let (_, key) = self.resolve(input)?;
        let status = self.cache.status(&key).map_err(|error| PipelineFailure {
            stage: None,
            key: Some(key.clone()),
            error,
        })?;
        Ok((key, status))
    }

    /// Drop every cached record of `input`.
    pub fn reset(&self, input: &str) -> Result<(VideoKey, bool), PipelineFailure> {
        let (_, key) = self.resolve(input)?;
        let deleted = self.cache.reset(&key).map_err(|error| PipelineFailure {
            stage: None,
            key: Some(key.clone()),
            error,
        })?;
        Ok((key, deleted))
    }
}
