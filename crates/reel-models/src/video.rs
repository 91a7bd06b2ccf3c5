//! Video records.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{SourceKind, VideoKey};

/// One source video known to the store.
///
/// `local_path` stays empty until a download completes; a record without it
/// marks an interrupted download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub key: VideoKey,
    /// Original URL or path as given by the caller
    pub source: String,
    pub source_kind: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoRecord {
    /// The downloaded file, if it is recorded and still present with content.
    pub fn usable_local_file(&self) -> Option<&Path> {
        self.local_path
            .as_deref()
            .filter(|path| is_nonempty_file(path))
    }
}

/// True when `path` is a regular file with at least one byte.
pub fn is_nonempty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
