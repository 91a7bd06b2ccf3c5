//! Store error types.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened, read or written.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("Highlight {rank} not found for video {key}")]
    HighlightNotFound { key: String, rank: u32 },

    /// A stored row could not be decoded.
    #[error("Corrupt record for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Unsupported schema version {found} (supported: {supported})")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}
