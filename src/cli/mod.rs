pub mod search;
pub mod status;
pub mod sync;

use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use notesync::config::NotesyncConfig;
use notesync::page::store::{PageStore, SqlitePageStore};
use notesync::sync::status::SyncTracker;

/// Open the configured database as a shared [`PageStore`].
pub fn open_store(config: &NotesyncConfig) -> Result<Arc<dyn PageStore>> {
    let db_path = config.resolved_db_path();
    let conn = notesync::db::open_database(&db_path)?;
    tracing::debug!(db = %db_path.display(), "database ready");
    Ok(Arc::new(SqlitePageStore::new(conn)))
}

/// Mark one page dirty and print its new status.
pub async fn mark(config: &NotesyncConfig, page_id: Uuid) -> Result<()> {
    let store = open_store(config)?;
    let tracker = SyncTracker::new(store);
    let status = tracker
        .mark_dirty(page_id)
        .await
        .with_context(|| format!("failed to mark page {page_id}"))?;
    println!("{page_id}: {status}");
    Ok(())
}
