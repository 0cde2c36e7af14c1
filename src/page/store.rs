//! Relational store adapter for pages and document mappings.
//!
//! [`PageStore`] is the async contract the cache and sync engine consume.
//! [`SqlitePageStore`] implements it over a shared rusqlite connection; each
//! call runs its SQL on the blocking pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{CoreError, Result};

use super::document::DocNode;
use super::types::{NewPage, Page, PageKind, PageMetadata, SyncStatus};

/// CRUD over `pages` and `document_mapping`.
#[async_trait]
pub trait PageStore: Send + Sync {
    async fn create_page(&self, page: NewPage) -> Result<Page>;

    /// Fetch a page by ID, including soft-deleted ones.
    async fn get_page(&self, id: Uuid) -> Result<Option<Page>>;

    /// All non-deleted pages, oldest first.
    async fn list_pages(&self) -> Result<Vec<Page>>;

    /// Replace the document and refresh the plain-text projection.
    async fn update_content(&self, id: Uuid, content: DocNode) -> Result<Page>;

    /// Overwrite the metadata column only.
    async fn update_metadata(&self, id: Uuid, metadata: &PageMetadata) -> Result<()>;

    /// Write `isMemSynced` only if the stored title and text still equal the
    /// given ones. The comparison and the write happen in one transaction.
    /// Returns false, writing nothing, when the page changed.
    async fn set_sync_status_if_unchanged(
        &self,
        id: Uuid,
        title: &str,
        text: &str,
        status: SyncStatus,
    ) -> Result<bool>;

    async fn set_organized(&self, id: Uuid, organized: bool) -> Result<()>;

    /// Re-parent a page. Rejects non-folder parents and cycles.
    async fn move_page(&self, id: Uuid, parent_id: Option<Uuid>) -> Result<()>;

    async fn soft_delete(&self, id: Uuid) -> Result<()>;

    /// Semantic-index document ID recorded for a page.
    async fn get_mapping(&self, page_id: Uuid) -> Result<Option<String>>;

    async fn upsert_mapping(&self, page_id: Uuid, document_id: &str) -> Result<()>;

    async fn delete_mapping(&self, page_id: Uuid) -> Result<()>;
}

/// [`PageStore`] backed by SQLite.
#[derive(Clone)]
pub struct SqlitePageStore {
    db: Arc<Mutex<Connection>>,
}

impl SqlitePageStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn from_shared(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| CoreError::Task(format!("db lock poisoned: {e}")))?;
            f(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl PageStore for SqlitePageStore {
    async fn create_page(&self, page: NewPage) -> Result<Page> {
        self.with_conn(move |conn| insert_page(conn, &page)).await
    }

    async fn get_page(&self, id: Uuid) -> Result<Option<Page>> {
        self.with_conn(move |conn| fetch_page(conn, id)).await
    }

    async fn list_pages(&self) -> Result<Vec<Page>> {
        self.with_conn(|conn| list_active_pages(conn)).await
    }

    async fn update_content(&self, id: Uuid, content: DocNode) -> Result<Page> {
        self.with_conn(move |conn| {
            let text = content.plain_text();
            let rows = conn.execute(
                "UPDATE pages SET content = ?1, text_content = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    serde_json::to_string(&content)?,
                    text,
                    now(),
                    id.to_string()
                ],
            )?;
            if rows == 0 {
                return Err(CoreError::PageNotFound(id));
            }
            fetch_page(conn, id)?.ok_or(CoreError::PageNotFound(id))
        })
        .await
    }

    async fn update_metadata(&self, id: Uuid, metadata: &PageMetadata) -> Result<()> {
        let json = serde_json::to_string(metadata)?;
        self.with_conn(move |conn| {
            let rows = conn.execute(
                "UPDATE pages SET metadata = ?1 WHERE id = ?2",
                params![json, id.to_string()],
            )?;
            if rows == 0 {
                return Err(CoreError::PageNotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn set_sync_status_if_unchanged(
        &self,
        id: Uuid,
        title: &str,
        text: &str,
        status: SyncStatus,
    ) -> Result<bool> {
        let (title, text) = (title.to_string(), text.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let page = fetch_page(&tx, id)?.ok_or(CoreError::PageNotFound(id))?;
            if page.title != title || page.text != text {
                return Ok(false);
            }

            let from = page.sync_status();
            if from == status {
                return Ok(true);
            }
            if !from.can_transition_to(status) {
                return Err(CoreError::InvalidTransition { from, to: status });
            }

            let mut metadata = page.metadata;
            metadata.is_mem_synced = status;
            tx.execute(
                "UPDATE pages SET metadata = ?1 WHERE id = ?2",
                params![serde_json::to_string(&metadata)?, id.to_string()],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn set_organized(&self, id: Uuid, organized: bool) -> Result<()> {
        self.with_conn(move |conn| {
            let rows = conn.execute(
                "UPDATE pages SET organized = ?1, updated_at = ?2 WHERE id = ?3",
                params![organized, now(), id.to_string()],
            )?;
            if rows == 0 {
                return Err(CoreError::PageNotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn move_page(&self, id: Uuid, parent_id: Option<Uuid>) -> Result<()> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if fetch_page(&tx, id)?.is_none() {
                return Err(CoreError::PageNotFound(id));
            }
            if let Some(parent) = parent_id {
                validate_parent(&tx, id, parent)?;
                ensure_acyclic(&tx, id, parent)?;
            }
            tx.execute(
                "UPDATE pages SET parent_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![parent_id.map(|p| p.to_string()), now(), id.to_string()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        self.with_conn(move |conn| {
            let rows = conn.execute(
                "UPDATE pages SET deleted = 1, updated_at = ?1 WHERE id = ?2",
                params![now(), id.to_string()],
            )?;
            if rows == 0 {
                return Err(CoreError::PageNotFound(id));
            }
            tracing::debug!(page_id = %id, "page soft-deleted");
            Ok(())
        })
        .await
    }

    async fn get_mapping(&self, page_id: Uuid) -> Result<Option<String>> {
        self.with_conn(move |conn| {
            let id = conn
                .query_row(
                    "SELECT document_id FROM document_mapping WHERE page_id = ?1",
                    params![page_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id)
        })
        .await
    }

    async fn upsert_mapping(&self, page_id: Uuid, document_id: &str) -> Result<()> {
        if document_id.is_empty() {
            return Err(CoreError::MissingField("document_id"));
        }
        let document_id = document_id.to_string();
        self.with_conn(move |conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO document_mapping (page_id, document_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?3) \
                 ON CONFLICT(page_id) DO UPDATE SET document_id = excluded.document_id, \
                 updated_at = excluded.updated_at",
                params![page_id.to_string(), document_id, ts],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_mapping(&self, page_id: Uuid) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM document_mapping WHERE page_id = ?1",
                params![page_id.to_string()],
            )?;
            Ok(())
        })
        .await
    }
}

// ── SQL helpers ──────────────────────────────────────────────────────────────

const PAGE_COLUMNS: &str = "id, title, type, parent_id, content, text_content, organized, \
                            metadata, deleted, created_at, updated_at";

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Insert a new page with fresh bookkeeping metadata.
fn insert_page(conn: &mut Connection, page: &NewPage) -> Result<Page> {
    let tx = conn.transaction()?;
    let id = Uuid::now_v7();

    if let Some(parent) = page.parent_id {
        validate_parent(&tx, id, parent)?;
    }

    let metadata = PageMetadata::for_new_page(page.kind);
    let ts = now();
    tx.execute(
        &format!(
            "INSERT INTO pages ({PAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)"
        ),
        params![
            id.to_string(),
            page.title,
            page.kind.as_str(),
            page.parent_id.map(|p| p.to_string()),
            serde_json::to_string(&page.content)?,
            page.content.plain_text(),
            page.organized,
            serde_json::to_string(&metadata)?,
            ts,
        ],
    )?;
    let created = fetch_page(&tx, id)?.ok_or(CoreError::PageNotFound(id))?;
    tx.commit()?;

    tracing::debug!(page_id = %id, kind = %page.kind, "page created");
    Ok(created)
}

fn fetch_page(conn: &Connection, id: Uuid) -> Result<Option<Page>> {
    let row = conn
        .query_row(
            &format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = ?1"),
            params![id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(PageRow::into_page).transpose()
}

fn list_active_pages(conn: &Connection) -> Result<Vec<Page>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAGE_COLUMNS} FROM pages WHERE deleted = 0 ORDER BY created_at, id"
    ))?;
    let rows = stmt
        .query_map([], read_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(PageRow::into_page).collect()
}

/// The parent must exist, be a folder and not be deleted.
fn validate_parent(conn: &Connection, page: Uuid, parent: Uuid) -> Result<()> {
    let row: Option<(String, bool)> = conn
        .query_row(
            "SELECT type, deleted FROM pages WHERE id = ?1",
            params![parent.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let reason = match row {
        None => "parent does not exist",
        Some((_, true)) => "parent is deleted",
        Some((kind, false)) if kind != PageKind::Folder.as_str() => "parent is not a folder",
        Some(_) => return Ok(()),
    };
    Err(CoreError::InvalidParent {
        page,
        parent,
        reason,
    })
}

/// Walk up from `parent`; reaching `page` means the move would close a loop.
fn ensure_acyclic(conn: &Connection, page: Uuid, parent: Uuid) -> Result<()> {
    let mut current = Some(parent.to_string());
    let target = page.to_string();
    let mut steps = 0usize;

    while let Some(id) = current {
        if id == target {
            return Err(CoreError::Cycle { page, parent });
        }
        steps += 1;
        if steps > 10_000 {
            // An existing loop in stored data; refuse rather than spin.
            return Err(CoreError::Cycle { page, parent });
        }
        current = conn
            .query_row(
                "SELECT parent_id FROM pages WHERE id = ?1",
                params![id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten();
    }
    Ok(())
}

struct PageRow {
    id: String,
    title: String,
    kind: String,
    parent_id: Option<String>,
    content: String,
    text: String,
    organized: bool,
    metadata: String,
    deleted: bool,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<PageRow> {
    Ok(PageRow {
        id: row.get(0)?,
        title: row.get(1)?,
        kind: row.get(2)?,
        parent_id: row.get(3)?,
        content: row.get(4)?,
        text: row.get(5)?,
        organized: row.get(6)?,
        metadata: row.get(7)?,
        deleted: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl PageRow {
    fn into_page(self) -> Result<Page> {
        let id = parse_uuid(&self.id)?;
        let parent_id = self.parent_id.as_deref().map(parse_uuid).transpose()?;
        let kind = self
            .kind
            .parse::<PageKind>()
            .map_err(|e| corrupt_row(format!("page {id}: {e}")))?;

        Ok(Page {
            id,
            title: self.title,
            kind,
            parent_id,
            content: serde_json::from_str(&self.content)?,
            text: self.text,
            organized: self.organized,
            metadata: serde_json::from_str(&self.metadata)?,
            deleted: self.deleted,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|_| corrupt_row(format!("not a uuid: {s}")))
}

fn corrupt_row(detail: String) -> CoreError {
    CoreError::Database(rusqlite::Error::InvalidColumnType(
        0,
        detail,
        rusqlite::types::Type::Text,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqlitePageStore {
        SqlitePageStore::new(crate::db::open_memory_database().unwrap())
    }

    #[tokio::test]
    async fn create_sets_initial_bookkeeping() {
        let store = store();
        let page = store
            .create_page(NewPage::file("Groceries", DocNode::from_plain_text("milk\neggs")))
            .await
            .unwrap();

        assert_eq!(page.text, "milk\neggs");
        assert_eq!(page.sync_status(), SyncStatus::Never);
        assert!(!page.metadata.is_folder);
        assert!(!page.deleted);

        let folder = store.create_page(NewPage::folder("Home")).await.unwrap();
        assert!(folder.metadata.is_folder);
        assert!(folder.is_folder());
    }

    #[tokio::test]
    async fn parent_must_be_existing_folder() {
        let store = store();
        let file = store
            .create_page(NewPage::file("a", DocNode::default()))
            .await
            .unwrap();

        let err = store
            .create_page(NewPage::file("b", DocNode::default()).in_folder(file.id))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidParent { reason: "parent is not a folder", .. }));

        let err = store
            .create_page(NewPage::file("c", DocNode::default()).in_folder(Uuid::now_v7()))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidParent { reason: "parent does not exist", .. }));

        let folder = store.create_page(NewPage::folder("f")).await.unwrap();
        let child = store
            .create_page(NewPage::file("d", DocNode::default()).in_folder(folder.id))
            .await
            .unwrap();
        assert_eq!(child.parent_id, Some(folder.id));
    }

    #[tokio::test]
    async fn move_rejects_cycles() {
        let store = store();
        let outer = store.create_page(NewPage::folder("outer")).await.unwrap();
        let inner = store
            .create_page(NewPage::folder("inner").in_folder(outer.id))
            .await
            .unwrap();

        let err = store.move_page(outer.id, Some(inner.id)).await.unwrap_err();
        assert!(matches!(err, CoreError::Cycle { .. }));

        let err = store.move_page(outer.id, Some(outer.id)).await.unwrap_err();
        assert!(matches!(err, CoreError::Cycle { .. }));

        store.move_page(inner.id, None).await.unwrap();
        store.move_page(outer.id, Some(inner.id)).await.unwrap();
    }

    #[tokio::test]
    async fn soft_delete_hides_from_listing() {
        let store = store();
        let page = store
            .create_page(NewPage::file("gone", DocNode::default()))
            .await
            .unwrap();
        store.soft_delete(page.id).await.unwrap();

        assert!(store.list_pages().await.unwrap().is_empty());
        let fetched = store.get_page(page.id).await.unwrap().unwrap();
        assert!(fetched.deleted);
    }

    #[tokio::test]
    async fn update_content_refreshes_text() {
        let store = store();
        let page = store
            .create_page(NewPage::file("n", DocNode::from_plain_text("A")))
            .await
            .unwrap();
        let updated = store
            .update_content(page.id, DocNode::from_plain_text("B\nA"))
            .await
            .unwrap();
        assert_eq!(updated.text, "B\nA");
    }

    #[tokio::test]
    async fn mapping_upsert_replaces() {
        let store = store();
        let page = store
            .create_page(NewPage::file("m", DocNode::default()))
            .await
            .unwrap();

        assert_eq!(store.get_mapping(page.id).await.unwrap(), None);
        store.upsert_mapping(page.id, "doc-1").await.unwrap();
        store.upsert_mapping(page.id, "doc-2").await.unwrap();
        assert_eq!(store.get_mapping(page.id).await.unwrap().as_deref(), Some("doc-2"));

        store.delete_mapping(page.id).await.unwrap();
        assert_eq!(store.get_mapping(page.id).await.unwrap(), None);

        let err = store.upsert_mapping(page.id, "").await.unwrap_err();
        assert!(matches!(err, CoreError::MissingField("document_id")));
    }

    #[tokio::test]
    async fn conditional_status_write_checks_current_text() {
        let store = store();
        let page = store
            .create_page(NewPage::file("t", DocNode::from_plain_text("body")))
            .await
            .unwrap();

        store
            .update_content(page.id, DocNode::from_plain_text("newer\nbody"))
            .await
            .unwrap();
        let written = store
            .set_sync_status_if_unchanged(page.id, "t", "body", SyncStatus::Yes)
            .await
            .unwrap();
        assert!(!written);
        assert_eq!(
            store.get_page(page.id).await.unwrap().unwrap().sync_status(),
            SyncStatus::Never
        );

        let written = store
            .set_sync_status_if_unchanged(page.id, "t", "newer\nbody", SyncStatus::Yes)
            .await
            .unwrap();
        assert!(written);
        assert_eq!(
            store.get_page(page.id).await.unwrap().unwrap().sync_status(),
            SyncStatus::Yes
        );
    }

    #[tokio::test]
    async fn missing_page_is_reported() {
        let store = store();
        let err = store.soft_delete(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, CoreError::PageNotFound(_)));
    }
}
