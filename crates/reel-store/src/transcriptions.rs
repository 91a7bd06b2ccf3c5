//! Transcription records.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use reel_models::{RawTranscript, TranscriptSegment, TranscriptionRecord, VideoKey};

use crate::error::{StoreError, StoreResult};
use crate::store::{now, parse_time, video_exists, VideoStore};

impl VideoStore {
    /// Store the transcript of a video unless one already exists.
    ///
    /// Returns the stored record, which is the earlier one if a transcript
    /// was already present. Fails with [`StoreError::VideoNotFound`] when the
    /// owning video record is missing.
    pub fn insert_transcription(
        &self,
        key: &VideoKey,
        transcript: &RawTranscript,
    ) -> StoreResult<TranscriptionRecord> {
        let segments_json = serde_json::to_string(&transcript.segments)
            .map_err(|e| StoreError::unavailable(format!("cannot encode segments: {}", e)))?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if !video_exists(&tx, key)? {
            return Err(StoreError::VideoNotFound(key.to_string()));
        }

        let inserted = tx.execute(
            "INSERT INTO transcriptions (video_key, text, segments_json, language, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(video_key) DO NOTHING",
            params![
                key.as_str(),
                transcript.text,
                segments_json,
                transcript.language,
                transcript.model,
                now()
            ],
        )?;
        let record = fetch_transcription(&tx, key)?
            .ok_or_else(|| StoreError::corrupt(key.as_str(), "transcription vanished after insert"))?;

        tx.commit()?;
        debug!(
            key = %key,
            inserted = inserted > 0,
            segments = record.segments.len(),
            "Stored transcription"
        );
        Ok(record)
    }

    pub fn get_transcription(&self, key: &VideoKey) -> StoreResult<Option<TranscriptionRecord>> {
        let conn = self.conn()?;
        fetch_transcription(&conn, key)
    }
}

fn fetch_transcription(
    conn: &Connection,
    key: &VideoKey,
) -> StoreResult<Option<TranscriptionRecord>> {
    let row = conn
        .query_row(
            "SELECT text, segments_json, language, model, created_at
             FROM transcriptions WHERE video_key = ?1",
            params![key.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((text, segments_json, language, model, created_at)) = row else {
        return Ok(None);
    };

    let segments: Vec<TranscriptSegment> = serde_json::from_str(&segments_json)
        .map_err(|e| StoreError::corrupt(key.as_str(), format!("bad segments JSON: {}", e)))?;

    Ok(Some(TranscriptionRecord {
        video_key: key.clone(),
        text,
        segments,
        language,
        model,
        created_at: parse_time(key.as_str(), &created_at)?,
    }))
}
