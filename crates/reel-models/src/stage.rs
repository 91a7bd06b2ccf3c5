//! Pipeline stages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The memoized stages of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Transcribe,
    Highlights,
    Crop,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Download,
        Stage::Transcribe,
        Stage::Highlights,
        Stage::Crop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Transcribe => "transcribe",
            Stage::Highlights => "highlights",
            Stage::Crop => "crop",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage '{}'", s))
    }
}

/// Which stages currently hold a valid cached result for a video.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatus {
    pub downloaded: bool,
    pub transcribed: bool,
    /// Number of stored highlights (0 when the stage is not complete).
    pub highlights: usize,
    /// Highlights whose rendered clip is present on disk.
    pub cropped: usize,
}

impl StageStatus {
    /// The first stage that still has work to do, if any.
    ///
    /// Crop counts as pending while no highlight has a rendered clip.
    pub fn next_pending(&self) -> Option<Stage> {
        if !self.downloaded {
            Some(Stage::Download)
        } else if !self.transcribed {
            Some(Stage::Transcribe)
        } else if self.highlights == 0 {
            Some(Stage::Highlights)
        } else if self.cropped == 0 {
            Some(Stage::Crop)
        } else {
            None
        }
    }
}
