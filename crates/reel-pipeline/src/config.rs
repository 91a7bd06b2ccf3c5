//! Pipeline configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};

/// Default Gemini REST endpoint.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Pipeline configuration.
#[derive(Clone)]
pub struct PipelineConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Downloads, extracted audio and Whisper output
    pub work_dir: PathBuf,
    /// Rendered vertical clips
    pub output_dir: PathBuf,
    /// Whisper model name (tiny, base, small, medium, large)
    pub whisper_model: String,
    /// Force a transcription language instead of auto-detection
    pub whisper_language: Option<String>,
    /// Number of top-ranked highlights to crop
    pub max_clips: usize,
    /// Target highlight duration bounds in seconds
    pub min_clip_secs: f64,
    pub max_clip_secs: f64,
    /// Generate a caption with hashtags for each highlight
    pub generate_captions: bool,
    /// Kill FFmpeg after this long
    pub ffmpeg_timeout: Duration,
    /// Hash full file content for local sources instead of size and mtime
    pub identity_content_hash: bool,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    /// Serve Prometheus metrics on this address when set
    pub metrics_addr: Option<SocketAddr>,
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("database_path", &self.database_path)
            .field("work_dir", &self.work_dir)
            .field("output_dir", &self.output_dir)
            .field("whisper_model", &self.whisper_model)
            .field("whisper_language", &self.whisper_language)
            .field("max_clips", &self.max_clips)
            .field("min_clip_secs", &self.min_clip_secs)
            .field("max_clip_secs", &self.max_clip_secs)
            .field("generate_captions", &self.generate_captions)
            .field("ffmpeg_timeout", &self.ffmpeg_timeout)
            .field("identity_content_hash", &self.identity_content_hash)
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<redacted>"))
            .field("gemini_base_url", &self.gemini_base_url)
            .field("metrics_addr", &self.metrics_addr)
            .finish()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(".reel/reel.db"),
            work_dir: PathBuf::from(".reel/work"),
            output_dir: PathBuf::from("clips"),
            whisper_model: "base".to_string(),
            whisper_language: None,
            max_clips: 1,
            min_clip_secs: 30.0,
            max_clip_secs: 60.0,
            generate_captions: true,
            ffmpeg_timeout: Duration::from_secs(1800), // 30 minutes
            identity_content_hash: false,
            gemini_api_key: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            metrics_addr: None,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|s| !s.trim().is_empty());

        Self {
            database_path: non_empty("REEL_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            work_dir: non_empty("REEL_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_dir: non_empty("REEL_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            whisper_model: non_empty("REEL_WHISPER_MODEL").unwrap_or(defaults.whisper_model),
            whisper_language: non_empty("REEL_WHISPER_LANGUAGE"),
            max_clips: parse_var(&lookup, "REEL_MAX_CLIPS").unwrap_or(defaults.max_clips),
            min_clip_secs: parse_var(&lookup, "REEL_MIN_CLIP_SECS").unwrap_or(defaults.min_clip_secs),
            max_clip_secs: parse_var(&lookup, "REEL_MAX_CLIP_SECS").unwrap_or(defaults.max_clip_secs),
            generate_captions: parse_var(&lookup, "REEL_GENERATE_CAPTIONS")
                .unwrap_or(defaults.generate_captions),
            ffmpeg_timeout: parse_var(&lookup, "REEL_FFMPEG_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_timeout),
            identity_content_hash: parse_var(&lookup, "REEL_IDENTITY_CONTENT_HASH")
                .unwrap_or(defaults.identity_content_hash),
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            gemini_base_url: non_empty("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            metrics_addr: parse_var(&lookup, "REEL_METRICS_ADDR"),
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> PipelineResult<()> {
        if !(self.min_clip_secs > 0.0 && self.min_clip_secs <= self.max_clip_secs) {
            return Err(PipelineError::config(format!(
                "clip duration bounds must satisfy 0 < min <= max (got {} and {})",
                self.min_clip_secs, self.max_clip_secs
            )));
        }
        if self.whisper_model.trim().is_empty() {
            return Err(PipelineError::config("whisper model must not be empty"));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> PipelineConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.max_clips, 1);
        assert_eq!(config.whisper_model, "base");
        assert!(config.gemini_api_key.is_none());
        assert!(config.metrics_addr.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reads_variables() {
        let config = config_from(&[
            ("REEL_DATABASE_PATH", "/var/lib/reel/db.sqlite"),
            ("REEL_MAX_CLIPS", "3"),
            ("REEL_GENERATE_CAPTIONS", "false"),
            ("REEL_FFMPEG_TIMEOUT_SECS", "90"),
            ("REEL_IDENTITY_CONTENT_HASH", "true"),
            ("GEMINI_API_KEY", "secret"),
            ("REEL_METRICS_ADDR", "127.0.0.1:9100"),
        ]);
        assert_eq!(config.database_path, PathBuf::from("/var/lib/reel/db.sqlite"));
        assert_eq!(config.max_clips, 3);
        assert!(!config.generate_captions);
        assert_eq!(config.ffmpeg_timeout, Duration::from_secs(90));
        assert!(config.identity_content_hash);
        assert_eq!(config.gemini_api_key.as_deref(), Some("secret"));
        assert_eq!(config.metrics_addr, Some("127.0.0.1:9100".parse().unwrap()));
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = config_from(&[("REEL_MAX_CLIPS", "lots"), ("GEMINI_API_KEY", "  ")]);
        assert_eq!(config.max_clips, 1);
        assert!(config.gemini_api_key.is_none());
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let config = config_from(&[("REEL_MIN_CLIP_SECS", "90"), ("REEL_MAX_CLIP_SECS", "60")]);
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = config_from(&[("GEMINI_API_KEY", "secret")]);
        assert!(!format!("{:?}", config).contains("secret"));
    }
}
