use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

// Timestamps named `*_at` are 12-byte HLC blobs, which SQLite compares
// bytewise in the same order as the clock. Wall-clock columns end in `_ms`.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS field_values (
    show_id INTEGER NOT NULL,
    form TEXT NOT NULL,
    field_key TEXT NOT NULL,
    value TEXT NOT NULL DEFAULT '',
    updated_at BLOB NOT NULL CHECK (length(updated_at) = 12),
    updated_by INTEGER NOT NULL,
    PRIMARY KEY (show_id, form, field_key)
);
CREATE INDEX IF NOT EXISTS idx_field_values_delta ON field_values (show_id, form, updated_at);

CREATE TABLE IF NOT EXISTS show_cursors (
    show_id INTEGER PRIMARY KEY,
    cursor BLOB NOT NULL CHECK (length(cursor) = 12)
);

CREATE TABLE IF NOT EXISTS presence (
    show_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    display_name TEXT NOT NULL,
    tab TEXT NOT NULL,
    focused_field TEXT,
    last_seen_ms INTEGER NOT NULL,
    PRIMARY KEY (show_id, user_id)
);

CREATE TABLE IF NOT EXISTS save_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    show_id INTEGER NOT NULL,
    form TEXT NOT NULL,
    saved_by INTEGER NOT NULL,
    saved_at_ms INTEGER NOT NULL,
    revision BLOB NOT NULL CHECK (length(revision) = 12),
    snapshot BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_save_history_show ON save_history (show_id, saved_at_ms);
";
