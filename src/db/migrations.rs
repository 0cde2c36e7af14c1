//! Forward-only schema migration framework.
//!
//! Tracks the schema version in `schema_meta` and runs sequential migrations
//! to bring the database up to [`CURRENT_SCHEMA_VERSION`].

use rusqlite::{params, Connection};

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

fn update_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Run any pending forward-only migrations. Each migration runs in a transaction.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(schema_version = version, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "running migration");

        let tx = conn.transaction()?;
        match next {
            2 => migrate_v1_to_v2(&tx)?,
            _ => {
                tracing::error!(version = next, "unknown migration target");
                break;
            }
        }
        update_schema_version(&tx, next)?;
        tx.commit()?;

        version = next;
    }

    Ok(())
}

/// Migration v1 → v2: backfill the typed metadata keys.
///
/// Records written before sync tracking existed have no `isMemSynced` and may
/// lack `isFolder`. Both are filled from the row so every page reads with an
/// explicit status.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    let rows: Vec<(String, String, String)> = {
        let mut stmt = conn.prepare("SELECT id, type, metadata FROM pages")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut backfilled = 0usize;
    for (id, kind, raw) in rows {
        let mut meta = match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => {
                tracing::warn!(page_id = %id, "unreadable page metadata, resetting");
                serde_json::Map::new()
            }
        };

        let mut changed = false;
        if !meta.contains_key("isMemSynced") {
            meta.insert("isMemSynced".into(), "never".into());
            changed = true;
        }
        if !meta.contains_key("isFolder") {
            meta.insert("isFolder".into(), (kind == "folder").into());
            changed = true;
        }

        if changed {
            conn.execute(
                "UPDATE pages SET metadata = ?1 WHERE id = ?2",
                params![serde_json::Value::Object(meta).to_string(), id],
            )?;
            backfilled += 1;
        }
    }

    tracing::info!(backfilled, "page metadata backfilled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn
    }

    fn insert_legacy(conn: &Connection, id: &str, kind: &str, metadata: &str) {
        conn.execute(
            "INSERT INTO pages (id, type, content, metadata, created_at, updated_at) \
             VALUES (?1, ?2, '{\"type\":\"doc\"}', ?3, 'then', 'then')",
            params![id, kind, metadata],
        )
        .unwrap();
    }

    fn metadata_of(conn: &Connection, id: &str) -> serde_json::Value {
        let raw: String = conn
            .query_row("SELECT metadata FROM pages WHERE id = ?1", [id], |r| r.get(0))
            .unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn get_schema_version_returns_1_on_fresh_db() {
        let conn = test_db();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn run_migrations_upgrades_to_current() {
        let mut conn = test_db();
        run_migrations(&mut conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn migration_v1_to_v2_backfills_metadata() {
        let mut conn = test_db();
        insert_legacy(&conn, "a", "file", r#"{"color":"red"}"#);
        insert_legacy(&conn, "b", "folder", "{}");
        insert_legacy(&conn, "c", "file", r#"{"isMemSynced":"yes","isFolder":false}"#);

        run_migrations(&mut conn).unwrap();

        let a = metadata_of(&conn, "a");
        assert_eq!(a["isMemSynced"], "never");
        assert_eq!(a["isFolder"], false);
        assert_eq!(a["color"], "red");

        assert_eq!(metadata_of(&conn, "b")["isFolder"], true);
        assert_eq!(metadata_of(&conn, "c")["isMemSynced"], "yes");
    }

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = test_db();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }
}
