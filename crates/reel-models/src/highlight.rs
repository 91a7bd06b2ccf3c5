//! Highlight models.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::VideoKey;
use crate::video::is_nonempty_file;

/// A candidate segment proposed by a highlight producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightCandidate {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Higher is better
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Social caption with hashtags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl HighlightCandidate {
    pub fn new(start: f64, end: f64, score: f64) -> Self {
        Self {
            start,
            end,
            score,
            title: None,
            reason: None,
            caption: None,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// One stored highlight of a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightRecord {
    pub video_key: VideoKey,
    /// 1 = best score
    pub rank: u32,
    pub start: f64,
    pub end: f64,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Rendered vertical clip, filled in by the crop stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl HighlightRecord {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// The rendered clip, if it is recorded and still present with content.
    pub fn usable_clip(&self) -> Option<&Path> {
        self.clip_path.as_deref().filter(|p| is_nonempty_file(p))
    }
}

/// Why a highlight set cannot be cached.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HighlightSetError {
    #[error("highlight set is empty")]
    Empty,

    #[error("highlight {index} has a non-finite bound")]
    NonFinite { index: usize },

    #[error("highlight {index} ends before it starts ({start:.2}s > {end:.2}s)")]
    Inverted { index: usize, start: f64, end: f64 },

    #[error("highlights are not ordered by start at index {index}")]
    Unordered { index: usize },

    #[error("duplicate highlight range {start:.2}s-{end:.2}s")]
    Duplicate { start: f64, end: f64 },
}

/// Check a highlight set given as `(start, end)` pairs in stored order.
///
/// A valid set is non-empty, ordered by start, has `end >= start` for every
/// entry and contains no duplicate range.
pub fn validate_highlight_set<I>(ranges: I) -> Result<(), HighlightSetError>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut prev_start: Option<f64> = None;
    let mut seen = HashSet::new();
    let mut count = 0usize;

    for (index, (start, end)) in ranges.into_iter().enumerate() {
        count += 1;
        if !start.is_finite() || !end.is_finite() {
            return Err(HighlightSetError::NonFinite { index });
        }
        if end < start {
            return Err(HighlightSetError::Inverted { index, start, end });
        }
        if prev_start.is_some_and(|p| start < p) {
            return Err(HighlightSetError::Unordered { index });
        }
        if !seen.insert((start.to_bits(), end.to_bits())) {
            return Err(HighlightSetError::Duplicate { start, end });
        }
        prev_start = Some(start);
    }

    if count == 0 {
        return Err(HighlightSetError::Empty);
    }
    Ok(())
}

/// Sort candidates by start (then end) in place.
pub fn sort_by_start(candidates: &mut [HighlightCandidate]) {
    candidates.sort_by(|a, b| {
        a.start
            .total_cmp(&b.start)
            .then_with(|| a.end.total_cmp(&b.end))
    });
}

/// Assign ranks by descending score; ties keep the earlier segment first.
///
/// Returns ranks aligned with `candidates`.
pub fn rank_by_score(candidates: &[HighlightCandidate]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .score
            .total_cmp(&candidates[a].score)
            .then_with(|| a.cmp(&b))
    });

    let mut ranks = vec![0u32; candidates.len()];
    for (position, index) in order.into_iter().enumerate() {
        ranks[index] = position as u32 + 1;
    }
    ranks
}
