//! Per-stage validity predicates and writes.

use std::path::PathBuf;

use reel_models::highlight::sort_by_start;
use reel_models::video::is_nonempty_file;
use reel_models::{
    validate_highlight_set, HighlightCandidate, HighlightRecord, RawTranscript, Stage,
    TranscriptionRecord, VideoKey, VideoRecord, VideoSource,
};
use reel_store::{StoreError, VideoStore};

use crate::error::PipelineResult;

/// What a store lookup found for a stage.
#[derive(Debug)]
pub(crate) enum Lookup<T> {
    /// Stored and valid.
    Hit(T),
    /// Stored but unusable.
    Stale(String),
    Missing,
}

/// One memoized stage: how to recognise a usable stored result, how to check
/// a freshly produced one, and how to write it.
pub(crate) trait CacheableStage {
    /// What the producer returns.
    type Raw;
    /// What callers get back, hit or miss.
    type Output;

    const STAGE: Stage;

    /// Sub-unit the stage is locked on, besides stage and key.
    fn unit(&self) -> Option<u32> {
        None
    }

    /// Runs before the first lookup.
    fn prepare(&self, _store: &VideoStore, _key: &VideoKey) -> PipelineResult<()> {
        Ok(())
    }

    fn lookup(&self, store: &VideoStore, key: &VideoKey) -> PipelineResult<Lookup<Self::Output>>;

    /// Reject producer output that must not be stored.
    fn validate(&self, raw: &mut Self::Raw) -> Result<(), String>;

    /// Persist a validated result as a single unit.
    fn commit(
        &self,
        store: &VideoStore,
        key: &VideoKey,
        raw: Self::Raw,
    ) -> PipelineResult<Self::Output>;
}

pub(crate) struct DownloadStage<'a> {
    pub source: &'a VideoSource,
}

impl CacheableStage for DownloadStage<'_> {
    type Raw = PathBuf;
    type Output = VideoRecord;

    const STAGE: Stage = Stage::Download;

    fn prepare(&self, store: &VideoStore, key: &VideoKey) -> PipelineResult<()> {
        store.upsert_video(key, self.source)?;
        Ok(())
    }

    fn lookup(&self, store: &VideoStore, key: &VideoKey) -> PipelineResult<Lookup<VideoRecord>> {
        Ok(match store.get_video(key)? {
            Some(video) if video.usable_local_file().is_some() => Lookup::Hit(video),
            Some(video) => Lookup::Stale(match &video.local_path {
                Some(path) => format!("{} is missing or empty", path.display()),
                None => "no local path recorded".to_string(),
            }),
            None => Lookup::Missing,
        })
    }

    fn validate(&self, raw: &mut PathBuf) -> Result<(), String> {
        if is_nonempty_file(raw.as_path()) {
            Ok(())
        } else {
            Err(format!("{} is missing or empty", raw.display()))
        }
    }

    fn commit(&self, store: &VideoStore, key: &VideoKey, raw: PathBuf) -> PipelineResult<VideoRecord> {
        Ok(store.record_download(key, self.source, &raw)?)
    }
}

pub(crate) struct TranscribeStage;

impl CacheableStage for TranscribeStage {
    type Raw = RawTranscript;
    type Output = TranscriptionRecord;

    const STAGE: Stage = Stage::Transcribe;

    fn lookup(
        &self,
        store: &VideoStore,
        key: &VideoKey,
    ) -> PipelineResult<Lookup<TranscriptionRecord>> {
        Ok(store
            .get_transcription(key)?
            .map_or(Lookup::Missing, Lookup::Hit))
    }

    fn validate(&self, raw: &mut RawTranscript) -> Result<(), String> {
        raw.validate()
    }

    fn commit(
        &self,
        store: &VideoStore,
        key: &VideoKey,
        raw: RawTranscript,
    ) -> PipelineResult<TranscriptionRecord> {
        Ok(store.insert_transcription(key, &raw)?)
    }
}

pub(crate) struct HighlightStage;

impl CacheableStage for HighlightStage {
    type Raw = Vec<HighlightCandidate>;
    type Output = Vec<HighlightRecord>;

    const STAGE: Stage = Stage::Highlights;

    fn lookup(
        &self,
        store: &VideoStore,
        key: &VideoKey,
    ) -> PipelineResult<Lookup<Vec<HighlightRecord>>> {
        let records = store.get_highlights(key)?;
        if records.is_empty() {
            return Ok(Lookup::Missing);
        }
        Ok(match validate_highlight_set(records.iter().map(|r| (r.start, r.end))) {
            Ok(()) => Lookup::Hit(records),
            Err(e) => Lookup::Stale(e.to_string()),
        })
    }

    fn validate(&self, raw: &mut Vec<HighlightCandidate>) -> Result<(), String> {
        sort_by_start(raw);
        validate_highlight_set(raw.iter().map(|c| (c.start, c.end))).map_err(|e| e.to_string())?;
        match raw.iter().find(|c| !c.score.is_finite()) {
            Some(c) => Err(format!(
                "highlight {:.2}s-{:.2}s has non-finite score",
                c.start, c.end
            )),
            None => Ok(()),
        }
    }

    fn commit(
        &self,
        store: &VideoStore,
        key: &VideoKey,
        raw: Vec<HighlightCandidate>,
    ) -> PipelineResult<Vec<HighlightRecord>> {
        Ok(store.replace_highlights(key, &raw)?)
    }
}

pub(crate) struct CropStage {
    pub rank: u32,
}

impl CacheableStage for CropStage {
    type Raw = PathBuf;
    type Output = HighlightRecord;

    const STAGE: Stage = Stage::Crop;

    fn unit(&self) -> Option<u32> {
        Some(self.rank)
    }

    fn lookup(&self, store: &VideoStore, key: &VideoKey) -> PipelineResult<Lookup<HighlightRecord>> {
        let highlight = store
            .get_highlight(key, self.rank)?
            .ok_or_else(|| StoreError::HighlightNotFound {
                key: key.to_string(),
                rank: self.rank,
            })?;

        if highlight.usable_clip().is_some() {
            return Ok(Lookup::Hit(highlight));
        }
        Ok(match &highlight.clip_path {
            Some(path) => Lookup::Stale(format!("{} is missing or empty", path.display())),
            None => Lookup::Missing,
        })
    }

    fn validate(&self, raw: &mut PathBuf) -> Result<(), String> {
        if is_nonempty_file(raw.as_path()) {
            Ok(())
        } else {
            Err(format!("{} is missing or empty", raw.display()))
        }
    }

    fn commit(&self, store: &VideoStore, key: &VideoKey, raw: PathBuf) -> PipelineResult<HighlightRecord> {
        Ok(store.set_clip_path(key, self.rank, &raw)?)
    }
}
