//! Highlight sets.
//!
//! The set of highlights for a video is written as one unit: a replace
//! deletes the previous rows and inserts the new ones inside a single
//! transaction, so readers never observe a partial set.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use reel_models::highlight::rank_by_score;
use reel_models::{HighlightCandidate, HighlightRecord, VideoKey};

use crate::error::{StoreError, StoreResult};
use crate::store::{now, parse_time, video_exists, VideoStore};

const HIGHLIGHT_COLUMNS: &str =
    "rank, start_secs, end_secs, score, title, reason, caption, clip_path, created_at";

impl VideoStore {
    /// Replace the highlight set of a video atomically.
    ///
    /// Ranks are assigned by descending score (1 = best). Returns the stored
    /// set ordered by start.
    pub fn replace_highlights(
        &self,
        key: &VideoKey,
        candidates: &[HighlightCandidate],
    ) -> StoreResult<Vec<HighlightRecord>> {
        let ranks = rank_by_score(candidates);
        let created_at = now();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if !video_exists(&tx, key)? {
            return Err(StoreError::VideoNotFound(key.to_string()));
        }

        tx.execute(
            "DELETE FROM highlights WHERE video_key = ?1",
            params![key.as_str()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO highlights
                 (video_key, rank, start_secs, end_secs, score, title, reason, caption, clip_path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9)",
            )?;
            for (candidate, rank) in candidates.iter().zip(&ranks) {
                stmt.execute(params![
                    key.as_str(),
                    rank,
                    candidate.start,
                    candidate.end,
                    candidate.score,
                    candidate.title,
                    candidate.reason,
                    candidate.caption,
                    created_at,
                ])?;
            }
        }
        let stored = fetch_highlights(&tx, key)?;

        // Dropping the transaction without commit rolls back on any error above.
        tx.commit()?;
        debug!(key = %key, count = stored.len(), "Replaced highlight set");
        Ok(stored)
    }

    /// Highlights of a video ordered by start.
    pub fn get_highlights(&self, key: &VideoKey) -> StoreResult<Vec<HighlightRecord>> {
        let conn = self.conn()?;
        fetch_highlights(&conn, key)
    }

    pub fn get_highlight(&self, key: &VideoKey, rank: u32) -> StoreResult<Option<HighlightRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM highlights WHERE video_key = ?1 AND rank = ?2",
                    HIGHLIGHT_COLUMNS
                ),
                params![key.as_str(), rank],
                HighlightRow::from_row,
            )
            .optional()?;
        row.map(|r| r.into_record(key)).transpose()
    }

    /// Record the rendered clip of one highlight.
    pub fn set_clip_path(
        &self,
        key: &VideoKey,
        rank: u32,
        clip_path: &Path,
    ) -> StoreResult<HighlightRecord> {
        let updated = {
            let conn = self.conn()?;
            conn.execute(
                "UPDATE highlights SET clip_path = ?3 WHERE video_key = ?1 AND rank = ?2",
                params![key.as_str(), rank, clip_path.to_string_lossy()],
            )?
        };
        if updated == 0 {
            return Err(StoreError::HighlightNotFound {
                key: key.to_string(),
                rank,
            });
        }

        debug!(key = %key, rank, path = %clip_path.display(), "Recorded clip path");
        self.get_highlight(key, rank)?.ok_or_else(|| StoreError::HighlightNotFound {
            key: key.to_string(),
            rank,
        })
    }
}

fn fetch_highlights(conn: &Connection, key: &VideoKey) -> StoreResult<Vec<HighlightRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM highlights WHERE video_key = ?1 ORDER BY start_secs, end_secs, rank",
        HIGHLIGHT_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![key.as_str()], HighlightRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(|r| r.into_record(key)).collect()
}

struct HighlightRow {
    rank: i64,
    start: f64,
    end: f64,
    score: f64,
    title: Option<String>,
    reason: Option<String>,
    caption: Option<String>,
    clip_path: Option<String>,
    created_at: String,
}

impl HighlightRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            rank: row.get(0)?,
            start: row.get(1)?,
            end: row.get(2)?,
            score: row.get(3)?,
            title: row.get(4)?,
            reason: row.get(5)?,
            caption: row.get(6)?,
            clip_path: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_record(self, key: &VideoKey) -> StoreResult<HighlightRecord> {
        let rank = u32::try_from(self.rank)
            .ok()
            .filter(|r| *r > 0)
            .ok_or_else(|| StoreError::corrupt(key.as_str(), format!("bad rank {}", self.rank)))?;

        Ok(HighlightRecord {
            video_key: key.clone(),
            rank,
            start: self.start,
            end: self.end,
            score: self.score,
            title: self.title,
            reason: self.reason,
            caption: self.caption,
            clip_path: self.clip_path.map(PathBuf::from),
            created_at: parse_time(key.as_str(), &self.created_at)?,
        })
    }
}
