//! Stage-memoizing clip pipeline.
//!
//! This crate provides:
//! - The stage cache (get-or-compute per stage, reset, status)
//! - Producers for download, transcription, highlight extraction and cropping
//! - A Gemini client for highlights and captions
//! - The pipeline driver used by the `reel` binary

pub mod config;
pub mod error;
pub mod gemini;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod producers;
pub mod retry;
pub mod stage_cache;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use gemini::HighlightClient;
pub use logging::StageLogger;
pub use pipeline::{Pipeline, PipelineFailure, PipelineReport};
pub use producers::{CropRequest, MediaProducers, Producers};
pub use stage_cache::{StageCache, StageOutput};
