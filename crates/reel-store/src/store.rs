//! Store handle and video records.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use reel_models::{SourceKind, VideoKey, VideoRecord, VideoSource};

use crate::error::{StoreError, StoreResult};
use crate::schema;

/// SQLite-backed store for video, transcription and highlight records.
///
/// Cloning is cheap; clones share one connection.
#[derive(Clone)]
pub struct VideoStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for VideoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoStore").field("path", &self.path).finish()
    }
}

const VIDEO_COLUMNS: &str = "key, source, source_kind, local_path, created_at, updated_at";

impl VideoStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::unavailable(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        info!(path = %path.display(), "Opened video store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::unavailable(format!("connection lock poisoned: {}", e)))
    }

    /// Insert the video record if it does not exist yet.
    ///
    /// An existing record is returned untouched.
    pub fn upsert_video(&self, key: &VideoKey, source: &VideoSource) -> StoreResult<VideoRecord> {
        let conn = self.conn()?;
        insert_video_if_absent(&conn, key, source)?;
        fetch_video(&conn, key)?.ok_or_else(|| StoreError::VideoNotFound(key.to_string()))
    }

    /// Upsert the video record and set its local file path in one transaction.
    pub fn record_download(
        &self,
        key: &VideoKey,
        source: &VideoSource,
        local_path: &Path,
    ) -> StoreResult<VideoRecord> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        insert_video_if_absent(&tx, key, source)?;
        tx.execute(
            "UPDATE videos SET local_path = ?2, updated_at = ?3 WHERE key = ?1",
            params![key.as_str(), local_path.to_string_lossy(), now()],
        )?;
        let record =
            fetch_video(&tx, key)?.ok_or_else(|| StoreError::VideoNotFound(key.to_string()))?;

        tx.commit()?;
        debug!(key = %key, path = %local_path.display(), "Recorded download");
        Ok(record)
    }

    pub fn get_video(&self, key: &VideoKey) -> StoreResult<Option<VideoRecord>> {
        let conn = self.conn()?;
        fetch_video(&conn, key)
    }

    /// All videos, most recently updated first.
    pub fn list_videos(&self) -> StoreResult<Vec<VideoRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM videos ORDER BY updated_at DESC, key",
            VIDEO_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], VideoRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(VideoRow::into_record).collect()
    }

    /// Delete a video and, by cascade, its transcription and highlights.
    ///
    /// Returns whether a record existed.
    pub fn delete_video(&self, key: &VideoKey) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute("DELETE FROM videos WHERE key = ?1", params![key.as_str()])?;
        tx.commit()?;
        if deleted > 0 {
            info!(key = %key, "Deleted video and dependent records");
        }
        Ok(deleted > 0)
    }
}

fn insert_video_if_absent(
    conn: &Connection,
    key: &VideoKey,
    source: &VideoSource,
) -> StoreResult<()> {
    let now = now();
    conn.execute(
        "INSERT INTO videos (key, source, source_kind, local_path, created_at, updated_at)
         VALUES (?1, ?2, ?3, NULL, ?4, ?4)
         ON CONFLICT(key) DO NOTHING",
        params![key.as_str(), source.reference(), source.kind().as_str(), now],
    )?;
    Ok(())
}

pub(crate) fn fetch_video(conn: &Connection, key: &VideoKey) -> StoreResult<Option<VideoRecord>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM videos WHERE key = ?1", VIDEO_COLUMNS),
            params![key.as_str()],
            VideoRow::from_row,
        )
        .optional()?;
    row.map(VideoRow::into_record).transpose()
}

pub(crate) fn video_exists(conn: &Connection, key: &VideoKey) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM videos WHERE key = ?1",
            params![key.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn parse_time(key: &str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(key, format!("bad timestamp '{}': {}", value, e)))
}

/// Raw column values of a `videos` row.
struct VideoRow {
    key: String,
    source: String,
    source_kind: String,
    local_path: Option<String>,
    created_at: String,
    updated_at: String,
}

impl VideoRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            source: row.get(1)?,
            source_kind: row.get(2)?,
            local_path: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_record(self) -> StoreResult<VideoRecord> {
        let source_kind = SourceKind::parse(&self.source_kind).ok_or_else(|| {
            StoreError::corrupt(&self.key, format!("unknown source kind '{}'", self.source_kind))
        })?;
        let created_at = parse_time(&self.key, &self.created_at)?;
        let updated_at = parse_time(&self.key, &self.updated_at)?;

        Ok(VideoRecord {
            key: VideoKey::new(self.key),
            source: self.source,
            source_kind,
            local_path: self.local_path.map(PathBuf::from),
            created_at,
            updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> (VideoKey, VideoSource) {
        let url = url_source("https://youtu.be/dQw4w9WgXcQ");
        (VideoKey::new("yt_dQw4w9WgXcQ"), url)
    }

    fn url_source(s: &str) -> VideoSource {
        VideoSource::parse(s).unwrap()
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = VideoStore::open_in_memory().unwrap();
        let (key, source) = remote();

        let first = store.upsert_video(&key, &source).unwrap();
        let second = store.upsert_video(&key, &source).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.source_kind, SourceKind::Remote);
        assert!(first.local_path.is_none());
        assert_eq!(store.list_videos().unwrap().len(), 1);
    }

    #[test]
    fn test_record_download_sets_path() {
        let store = VideoStore::open_in_memory().unwrap();
        let (key, source) = remote();

        let record = store
            .record_download(&key, &source, Path::new("/tmp/reel/source.mp4"))
            .unwrap();
        assert_eq!(record.local_path.as_deref(), Some(Path::new("/tmp/reel/source.mp4")));

        // upserting again keeps the recorded path
        let again = store.upsert_video(&key, &source).unwrap();
        assert_eq!(again.local_path, record.local_path);
    }

    #[test]
    fn test_reads_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("reel.db");
        let (key, source) = remote();

        {
            let store = VideoStore::open(&db).unwrap();
            store
                .record_download(&key, &source, Path::new("/data/source.mp4"))
                .unwrap();
        }

        let reopened = VideoStore::open(&db).unwrap();
        let record = reopened.get_video(&key).unwrap().unwrap();
        assert_eq!(record.local_path.as_deref(), Some(Path::new("/data/source.mp4")));
    }

    #[test]
    fn test_delete_video() {
        let store = VideoStore::open_in_memory().unwrap();
        let (key, source) = remote();
        store.upsert_video(&key, &source).unwrap();

        assert!(store.delete_video(&key).unwrap());
        assert!(!store.delete_video(&key).unwrap());
        assert!(store.get_video(&key).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_row_is_reported() {
        let store = VideoStore::open_in_memory().unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO videos VALUES ('k', 's', 'satellite', NULL, 'x', 'x')",
                [],
            )
            .unwrap();
        assert!(matches!(
            store.get_video(&VideoKey::new("k")),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
