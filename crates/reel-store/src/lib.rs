//! SQLite persistence for the reel pipeline.
//!
//! This crate provides:
//! - Schema creation and versioning
//! - Video records (idempotent upsert, download path updates)
//! - Transcription records (insert-if-absent)
//! - Highlight sets (replaced atomically) and rendered clip paths

pub mod error;
mod highlights;
pub mod schema;
mod store;
mod transcriptions;

pub use error::{StoreError, StoreResult};
pub use store::VideoStore;
