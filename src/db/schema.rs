//! SQL DDL for all notesync tables.
//!
//! Defines the `pages`, `document_mapping` and `schema_meta` tables. All DDL
//! uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// All schema DDL statements for the core tables.
const SCHEMA_SQL: &str = r#"
-- Pages form a tree through parent_id; deletion is a soft flag.
CREATE TABLE IF NOT EXISTS pages (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    type TEXT NOT NULL CHECK(type IN ('file','folder')),
    parent_id TEXT REFERENCES pages(id),
    content TEXT NOT NULL,
    text_content TEXT NOT NULL DEFAULT '',
    organized INTEGER NOT NULL DEFAULT 1,
    metadata TEXT NOT NULL DEFAULT '{}',
    deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pages_parent ON pages(parent_id);
CREATE INDEX IF NOT EXISTS idx_pages_deleted ON pages(deleted);
CREATE INDEX IF NOT EXISTS idx_pages_created ON pages(created_at);

-- Page -> semantic index document
CREATE TABLE IF NOT EXISTS document_mapping (
    page_id TEXT PRIMARY KEY REFERENCES pages(id),
    document_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
