//! Vertical (9:16) clip rendering.

use std::path::Path;

use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Output settings for vertical clips.
#[derive(Debug, Clone)]
pub struct VerticalCropOptions {
    pub width: u32,
    pub height: u32,
    pub crf: u8,
    pub preset: String,
    pub audio_bitrate: String,
}

impl Default for VerticalCropOptions {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            crf: 23,
            preset: "veryfast".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }
}

impl VerticalCropOptions {
    /// Center crop to 9:16, then scale to the output size.
    ///
    /// The `min()` bounds keep the crop inside frames that are already
    /// narrower than 9:16.
    pub fn filter(&self) -> String {
        format!(
            "crop=w='min(iw,ih*9/16)':h='min(ih,iw*16/9)',scale={}:{},setsar=1",
            self.width, self.height
        )
    }
}

/// Render `[start, end]` of `input` as a vertical clip at `output`.
pub async fn crop_vertical(
    runner: &FfmpegRunner,
    input: &Path,
    output: &Path,
    start: f64,
    end: f64,
    options: &VerticalCropOptions,
) -> MediaResult<()> {
    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }
    if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
        return Err(MediaError::InvalidRange(format!("{:.2}s-{:.2}s", start, end)));
    }
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let duration = end - start;
    let cmd = build_crop_command(input, output, start, duration, options);

    info!(
        input = %input.display(),
        output = %output.display(),
        start,
        duration,
        "Rendering vertical clip"
    );
    let total_ms = (duration * 1000.0) as i64;
    runner
        .run_with_progress(&cmd, move |p| {
            debug!(percent = p.percentage(total_ms), speed = p.speed, "Crop progress");
        })
        .await?;

    let size = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
    if size == 0 {
        return Err(MediaError::ffmpeg_failed("FFmpeg produced an empty clip", None, None));
    }
    Ok(())
}

fn build_crop_command(
    input: &Path,
    output: &Path,
    start: f64,
    duration: f64,
    options: &VerticalCropOptions,
) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .seek(start)
        .duration(duration)
        .video_filter(options.filter())
        .video_codec("libx264")
        .preset(options.preset.clone())
        .crf(options.crf)
        .audio_codec("aac")
        .audio_bitrate(options.audio_bitrate.clone())
        .output_args(["-movflags", "+faststart"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(
            VerticalCropOptions::default().filter(),
            "crop=w='min(iw,ih*9/16)':h='min(ih,iw*16/9)',scale=1080:1920,setsar=1"
        );
    }

    #[test]
    fn test_crop_command_args() {
        let args = build_crop_command(
            Path::new("in.mp4"),
            Path::new("out.mp4"),
            40.0,
            18.0,
            &VerticalCropOptions::default(),
        )
        .build_args();

        assert!(args.windows(2).any(|w| w[0] == "-ss" && w[1] == "40.000"));
        assert!(args.windows(2).any(|w| w[0] == "-t" && w[1] == "18.000"));
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libx264"));
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "aac"));
    }

    #[tokio::test]
    async fn test_rejects_bad_range_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mp4");
        std::fs::write(&input, b"not really a video").unwrap();

        let result = crop_vertical(
            &FfmpegRunner::new(),
            &input,
            &dir.path().join("out.mp4"),
            30.0,
            10.0,
            &VerticalCropOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(MediaError::InvalidRange(_))));
    }

    #[tokio::test]
    async fn test_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = crop_vertical(
            &FfmpegRunner::new(),
            &dir.path().join("missing.mp4"),
            &dir.path().join("out.mp4"),
            0.0,
            10.0,
            &VerticalCropOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
