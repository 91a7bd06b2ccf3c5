//! Pipeline error types.

use reel_models::{IdentityError, Stage};
use reel_store::StoreError;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    UnresolvableSource(#[from] IdentityError),

    /// A producer returned output that failed validation; nothing was stored.
    #[error("{stage} produced invalid output for {key}: {reason}")]
    StageProductionFailed {
        stage: Stage,
        key: String,
        reason: String,
    },

    /// Opening, reading or writing the store failed.
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Highlight extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Cropping failed: {0}")]
    CroppingFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn production_failed(stage: Stage, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StageProductionFailed {
            stage,
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn transcription_failed(msg: impl Into<String>) -> Self {
        Self::TranscriptionFailed(msg.into())
    }

    pub fn extraction_failed(msg: impl Into<String>) -> Self {
        Self::ExtractionFailed(msg.into())
    }

    pub fn cropping_failed(msg: impl Into<String>) -> Self {
        Self::CroppingFailed(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short machine-friendly kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::UnresolvableSource(_) => "unresolvable_source",
            PipelineError::StageProductionFailed { .. } => "invalid_output",
            PipelineError::StoreUnavailable(_) => "store",
            PipelineError::DownloadFailed(_) => "download",
            PipelineError::TranscriptionFailed(_) => "transcription",
            PipelineError::ExtractionFailed(_) => "extraction",
            PipelineError::CroppingFailed(_) => "cropping",
            PipelineError::Config(_) => "config",
        }
    }
}
