//! Transcript models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::VideoKey;
use crate::timestamp::format_timestamp;

/// One timed piece of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            speaker: None,
        }
    }
}

/// Transcript as returned by a transcription producer, before it is stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTranscript {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Model/version tag of the producer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl RawTranscript {
    /// Silent audio yields no segments; an empty text is then legitimate.
    pub fn is_silent(&self) -> bool {
        self.segments.is_empty()
    }

    /// Check the transcript before it may be cached.
    pub fn validate(&self) -> Result<(), String> {
        if self.text.trim().is_empty() && !self.is_silent() {
            return Err(format!(
                "empty transcript text with {} segments",
                self.segments.len()
            ));
        }
        if let Some(seg) = self
            .segments
            .iter()
            .find(|s| !s.start.is_finite() || !s.end.is_finite() || s.end < s.start)
        {
            return Err(format!(
                "segment ends before it starts ({:.2} > {:.2})",
                seg.start, seg.end
            ));
        }
        Ok(())
    }
}

/// Stored transcript of one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionRecord {
    pub video_key: VideoKey,
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TranscriptionRecord {
    /// Render the transcript one segment per line as
    /// `[start] Speaker: text [end]`, the form highlight models are prompted with.
    pub fn to_prompt_text(&self) -> String {
        format_for_prompt(&self.segments)
    }
}

/// See [`TranscriptionRecord::to_prompt_text`].
pub fn format_for_prompt(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| {
            format!(
                "[{}] {}: {} [{}]",
                format_timestamp(s.start),
                s.speaker.as_deref().unwrap_or("Speaker"),
                s.text.trim(),
                format_timestamp(s.end)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Concatenated text of the segments overlapping `[start, end]`.
pub fn text_in_range(segments: &[TranscriptSegment], start: f64, end: f64) -> String {
    segments
        .iter()
        .filter(|s| s.end > start && s.start < end)
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
