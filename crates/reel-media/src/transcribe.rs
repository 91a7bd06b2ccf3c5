//! Audio extraction and Whisper CLI transcription.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use reel_models::{RawTranscript, TranscriptSegment};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{last_stderr_line, MediaError, MediaResult};

const AUDIO_FILE_STEM: &str = "audio";

/// Extract 16 kHz mono PCM audio, the input format Whisper expects.
pub async fn extract_audio(
    runner: &FfmpegRunner,
    video_path: &Path,
    audio_path: &Path,
) -> MediaResult<()> {
    if !video_path.exists() {
        return Err(MediaError::FileNotFound(video_path.to_path_buf()));
    }

    let cmd = FfmpegCommand::new(video_path, audio_path)
        .no_video()
        .output_args(["-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"]);
    runner.run(&cmd).await?;

    debug!(audio = %audio_path.display(), "Extracted audio");
    Ok(())
}

/// Whisper command-line transcriber.
#[derive(Debug, Clone)]
pub struct WhisperCli {
    binary: String,
    model: String,
    language: Option<String>,
}

impl Default for WhisperCli {
    fn default() -> Self {
        Self {
            binary: "whisper".to_string(),
            model: "base".to_string(),
            language: None,
        }
    }
}

impl WhisperCli {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Force a language instead of letting Whisper detect it.
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language.filter(|l| !l.trim().is_empty());
        self
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Model/version tag recorded next to the transcript.
    pub fn model_tag(&self) -> String {
        format!("whisper-{}", self.model)
    }

    /// Transcribe a media file, using `work_dir` for intermediate files.
    pub async fn transcribe(
        &self,
        runner: &FfmpegRunner,
        media_path: &Path,
        work_dir: &Path,
    ) -> MediaResult<RawTranscript> {
        which::which(&self.binary).map_err(|_| MediaError::WhisperNotFound(self.binary.clone()))?;
        tokio::fs::create_dir_all(work_dir).await?;

        let audio_path = work_dir.join(format!("{}.wav", AUDIO_FILE_STEM));
        extract_audio(runner, media_path, &audio_path).await?;

        let args = self.args(&audio_path, work_dir);
        info!(model = %self.model, media = %media_path.display(), "Transcribing audio");
        debug!("Running {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(MediaError::transcription_failed(format!(
                "{} failed: {}",
                self.binary,
                last_stderr_line(&output.stderr)
            )));
        }

        // Whisper names its output after the input file
        let json_path: PathBuf = work_dir.join(format!("{}.json", AUDIO_FILE_STEM));
        let json = tokio::fs::read_to_string(&json_path)
            .await
            .map_err(|e| {
                MediaError::transcription_failed(format!(
                    "missing output {}: {}",
                    json_path.display(),
                    e
                ))
            })?;

        let transcript = parse_whisper_json(&json, &self.model_tag())?;
        info!(
            segments = transcript.segments.len(),
            language = transcript.language.as_deref().unwrap_or("unknown"),
            "Transcription complete"
        );
        Ok(transcript)
    }

    fn args(&self, audio_path: &Path, output_dir: &Path) -> Vec<String> {
        let mut args = vec![
            audio_path.to_string_lossy().to_string(),
            "--model".to_string(),
            self.model.clone(),
            "--output_format".to_string(),
            "json".to_string(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().to_string(),
            "--verbose".to_string(),
            "False".to_string(),
        ];
        if let Some(language) = &self.language {
            args.push("--language".to_string());
            args.push(language.clone());
        }
        args
    }
}

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    text: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

/// Convert Whisper's JSON output into a transcript.
pub fn parse_whisper_json(json: &str, model_tag: &str) -> MediaResult<RawTranscript> {
    let output: WhisperOutput = serde_json::from_str(json)?;

    let segments = output
        .segments
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| TranscriptSegment::new(s.start, s.end, s.text.trim()))
        .collect();

    Ok(RawTranscript {
        text: output.text.trim().to_string(),
        segments,
        language: output.language,
        model: Some(model_tag.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whisper_json() {
        let json = r#"{
            "text": " Welcome back. Today we talk caching.",
            "segments": [
                {"id": 0, "seek": 0, "start": 0.0, "end": 4.5, "text": " Welcome back.", "tokens": [1, 2]},
                {"id": 1, "seek": 0, "start": 4.5, "end": 9.0, "text": " Today we talk caching."},
                {"id": 2, "seek": 0, "start": 9.0, "end": 9.5, "text": "  "}
            ],
            "language": "en"
        }"#;

        let transcript = parse_whisper_json(json, "whisper-base").unwrap();
        assert_eq!(transcript.text, "Welcome back. Today we talk caching.");
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[1].text, "Today we talk caching.");
        assert_eq!(transcript.language.as_deref(), Some("en"));
        assert_eq!(transcript.model.as_deref(), Some("whisper-base"));
    }

    #[test]
    fn test_parse_silent_output() {
        let transcript = parse_whisper_json(r#"{"text": "", "segments": []}"#, "whisper-tiny").unwrap();
        assert!(transcript.is_silent());
        assert!(transcript.validate().is_ok());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_whisper_json("not json", "whisper-base"),
            Err(MediaError::JsonParse(_))
        ));
    }

    #[test]
    fn test_whisper_args() {
        let cli = WhisperCli::new("small").with_language(Some("de".to_string()));
        let args = cli.args(Path::new("/w/audio.wav"), Path::new("/w"));
        assert_eq!(args[0], "/w/audio.wav");
        assert!(args.windows(2).any(|w| w[0] == "--model" && w[1] == "small"));
        assert!(args.windows(2).any(|w| w[0] == "--language" && w[1] == "de"));
        assert_eq!(cli.model_tag(), "whisper-small");

        let auto = WhisperCli::default().with_language(Some(" ".to_string()));
        assert!(!auto.args(Path::new("a.wav"), Path::new(".")).contains(&"--language".to_string()));
    }
}
