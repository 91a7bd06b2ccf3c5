//! External media tool wrappers.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a runner with timeout and progress
//! - Video download via yt-dlp
//! - Audio extraction and transcription via the Whisper CLI
//! - Vertical (9:16) clip rendering

pub mod command;
pub mod crop;
pub mod download;
pub mod error;
pub mod progress;
pub mod transcribe;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use crop::{crop_vertical, VerticalCropOptions};
pub use download::download_video;
pub use error::{MediaError, MediaResult};
pub use progress::FfmpegProgress;
pub use transcribe::{extract_audio, WhisperCli};
