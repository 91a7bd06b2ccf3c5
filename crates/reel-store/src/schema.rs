//! SQL schema for the reel store.
//!
//! Applied at open time and gated on `PRAGMA user_version`.

use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Current schema version.
pub const SCHEMA_VERSION: i64 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Version 1 DDL; idempotent thanks to `IF NOT EXISTS`.
const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS videos (
    key         TEXT PRIMARY KEY,
    source      TEXT NOT NULL,
    source_kind TEXT NOT NULL,      -- 'remote' | 'local'
    local_path  TEXT,               -- NULL until the download completes
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS transcriptions (
    video_key     TEXT PRIMARY KEY REFERENCES videos(key) ON DELETE CASCADE,
    text          TEXT NOT NULL,
    segments_json TEXT NOT NULL,
    language      TEXT,
    model         TEXT,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS highlights (
    video_key  TEXT NOT NULL REFERENCES videos(key) ON DELETE CASCADE,
    rank       INTEGER NOT NULL,
    start_secs REAL NOT NULL,
    end_secs   REAL NOT NULL,
    score      REAL NOT NULL,
    title      TEXT,
    reason     TEXT,
    caption    TEXT,
    clip_path  TEXT,                -- NULL until the crop stage renders it
    created_at TEXT NOT NULL,
    PRIMARY KEY (video_key, rank)
);

CREATE INDEX IF NOT EXISTS idx_highlights_start ON highlights(video_key, start_secs, end_secs);
";

/// Configure connection pragmas and bring the schema up to date.
pub fn initialize(conn: &Connection) -> StoreResult<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    debug!(journal_mode = %mode, "SQLite connection configured");

    migrate(conn)
}

pub fn schema_version(conn: &Connection) -> StoreResult<i64> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

fn migrate(conn: &Connection) -> StoreResult<()> {
    let current = schema_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchemaVersion {
            found: current,
            supported: SCHEMA_VERSION,
        });
    }

    if current < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
        debug!(version = 1, "Applied store schema");
    }

    Ok(())
}
