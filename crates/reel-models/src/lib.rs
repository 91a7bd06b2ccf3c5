//! Shared data models for the reel pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video identity keys and source resolution
//! - Video, transcription and highlight records
//! - Pipeline stages and their completion status
//! - Timestamp parsing shared by producers

pub mod highlight;
pub mod identity;
pub mod stage;
pub mod timestamp;
pub mod transcript;
pub mod video;
pub mod youtube;

// Re-export common types
pub use highlight::{validate_highlight_set, HighlightCandidate, HighlightRecord, HighlightSetError};
pub use identity::{IdentityError, IdentityResolver, IdentityResult, SourceKind, VideoKey, VideoSource};
pub use stage::{Stage, StageStatus};
pub use timestamp::{format_timestamp, parse_timestamp, TimestampError};
pub use transcript::{RawTranscript, TranscriptSegment, TranscriptionRecord};
pub use video::VideoRecord;
pub use youtube::extract_youtube_id;
