//! Stage producers: the real work behind each cache miss.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use reel_media::{FfmpegRunner, VerticalCropOptions, WhisperCli};
use reel_models::video::is_nonempty_file;
use reel_models::{HighlightCandidate, RawTranscript, TranscriptSegment, VideoKey, VideoSource};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::gemini::HighlightClient;

/// One highlight to render as a vertical clip.
#[derive(Debug, Clone, Copy)]
pub struct CropRequest<'a> {
    pub media: &'a Path,
    pub key: &'a VideoKey,
    pub rank: u32,
    pub start: f64,
    pub end: f64,
}

/// The four stage computations.
///
/// Implementations must not touch the store; the stage cache validates and
/// persists whatever they return.
#[async_trait]
pub trait Producers: Send + Sync {
    /// Fetch the source and return its local file path.
    async fn download(&self, source: &VideoSource, key: &VideoKey) -> PipelineResult<PathBuf>;

    async fn transcribe(&self, media: &Path, key: &VideoKey) -> PipelineResult<RawTranscript>;

    async fn extract_highlights(
        &self,
        text: &str,
        segments: &[TranscriptSegment],
    ) -> PipelineResult<Vec<HighlightCandidate>>;

    /// Render one highlight and return the output path.
    async fn crop_vertical(&self, request: CropRequest<'_>) -> PipelineResult<PathBuf>;
}

/// Producers backed by yt-dlp, Whisper, Gemini and FFmpeg.
#[derive(Debug, Clone)]
pub struct MediaProducers {
    runner: FfmpegRunner,
    whisper: WhisperCli,
    highlights: Option<HighlightClient>,
    crop_options: VerticalCropOptions,
    work_dir: PathBuf,
    output_dir: PathBuf,
}

impl MediaProducers {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            runner: FfmpegRunner::new().with_timeout(config.ffmpeg_timeout.as_secs()),
            whisper: WhisperCli::new(config.whisper_model.clone())
                .with_language(config.whisper_language.clone()),
            highlights: HighlightClient::from_config(config),
            crop_options: VerticalCropOptions::default(),
            work_dir: config.work_dir.clone(),
            output_dir: config.output_dir.clone(),
        }
    }

    fn video_work_dir(&self, key: &VideoKey) -> PathBuf {
        self.work_dir.join(key.as_str())
    }

    /// Output path for the clip of highlight `rank`.
    pub fn clip_path(&self, key: &VideoKey, rank: u32) -> PathBuf {
        self.output_dir
            .join(key.as_str())
            .join(format!("clip_{:02}.mp4", rank))
    }
}

#[async_trait]
impl Producers for MediaProducers {
    async fn download(&self, source: &VideoSource, key: &VideoKey) -> PipelineResult<PathBuf> {
        match source {
            VideoSource::Remote(url) => {
                reel_media::download_video(url.as_str(), &self.video_work_dir(key))
                    .await
                    .map_err(|e| PipelineError::download_failed(e.to_string()))
            }
            VideoSource::Local(path) => {
                if !is_nonempty_file(path) {
                    return Err(PipelineError::download_failed(format!(
                        "local file {} is missing or empty",
                        path.display()
                    )));
                }
                info!(path = %path.display(), "Using local video file");
                Ok(path.clone())
            }
        }
    }

    async fn transcribe(&self, media: &Path, key: &VideoKey) -> PipelineResult<RawTranscript> {
        let work_dir = self.video_work_dir(key).join("transcribe");
        self.whisper
            .transcribe(&self.runner, media, &work_dir)
            .await
            .map_err(|e| PipelineError::transcription_failed(e.to_string()))
    }

    async fn extract_highlights(
        &self,
        _text: &str,
        segments: &[TranscriptSegment],
    ) -> PipelineResult<Vec<HighlightCandidate>> {
        let client = self
            .highlights
            .as_ref()
            .ok_or_else(|| PipelineError::extraction_failed("GEMINI_API_KEY not set"))?;
        client.extract(segments).await
    }

    async fn crop_vertical(&self, request: CropRequest<'_>) -> PipelineResult<PathBuf> {
        let output = self.clip_path(request.key, request.rank);
        reel_media::crop_vertical(
            &self.runner,
            request.media,
            &output,
            request.start,
            request.end,
            &self.crop_options,
        )
        .await
        .map_err(|e| PipelineError::cropping_failed(e.to_string()))?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn producers(dir: &Path) -> MediaProducers {
        let config = PipelineConfig {
            work_dir: dir.join("work"),
            output_dir: dir.join("clips"),
            ..Default::default()
        };
        MediaProducers::from_config(&config)
    }

    #[test]
    fn test_clip_path_layout() {
        let producers = producers(Path::new("/data"));
        assert_eq!(
            producers.clip_path(&VideoKey::new("yt_dQw4w9WgXcQ"), 2),
            PathBuf::from("/data/clips/yt_dQw4w9WgXcQ/clip_02.mp4")
        );
    }

    #[tokio::test]
    async fn test_local_download_returns_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("talk.mp4");
        std::fs::write(&file, b"frames").unwrap();

        let key = VideoKey::new("file_abc");
        let path = producers(dir.path())
            .download(&VideoSource::Local(file.clone()), &key)
            .await
            .unwrap();
        assert_eq!(path, file);
    }

    #[tokio::test]
    async fn test_local_download_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("empty.mp4");
        std::fs::write(&file, b"").unwrap();

        let result = producers(dir.path())
            .download(&VideoSource::Local(file), &VideoKey::new("file_abc"))
            .await;
        assert!(matches!(result, Err(PipelineError::DownloadFailed(_))));
    }

    #[tokio::test]
    async fn test_extraction_requires_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let segments = vec![TranscriptSegment::new(0.0, 40.0, "hello")];
        let result = producers(dir.path()).extract_highlights("hello", &segments).await;
        assert!(matches!(result, Err(PipelineError::ExtractionFailed(_))));
    }
}
