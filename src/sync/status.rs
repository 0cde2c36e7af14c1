//! Three-state sync tracking persisted in page metadata.
//!
//! `never` → `no` → `yes`, `never` → `yes` after a push, and `yes` → `no` on
//! edit. Nothing moves back to `never`.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::page::store::PageStore;
use crate::page::types::{OrganizeStatus, Page, SyncStatus};

impl SyncStatus {
    /// Whether the page still has to be pushed.
    pub fn needs_sync(self) -> bool {
        matches!(self, Self::Never | Self::No)
    }

    /// Status after a content edit. A page that was never pushed stays
    /// `never` so the next push is an add, not an update.
    pub fn after_content_change(self) -> SyncStatus {
        match self {
            Self::Never => Self::Never,
            Self::No | Self::Yes => Self::No,
        }
    }

    pub fn can_transition_to(self, to: SyncStatus) -> bool {
        self == to || to != Self::Never
    }
}

/// Folders, pages queued for organization and unorganized pages are not indexed.
pub fn is_eligible(page: &Page) -> bool {
    !page.is_folder()
        && page.metadata.organize_status != Some(OrganizeStatus::Soon)
        && page.organized
        && !page.deleted
}

/// Persists status changes with a fresh read of the page before every write.
#[derive(Clone)]
pub struct SyncTracker {
    store: Arc<dyn PageStore>,
}

impl SyncTracker {
    pub fn new(store: Arc<dyn PageStore>) -> Self {
        Self { store }
    }

    /// Current persisted status.
    pub async fn status(&self, page_id: Uuid) -> Result<SyncStatus> {
        let page = self
            .store
            .get_page(page_id)
            .await?
            .ok_or(CoreError::PageNotFound(page_id))?;
        Ok(page.sync_status())
    }

    /// Read-modify-write of `isMemSynced`. Other metadata written since the
    /// caller's copy was taken is preserved. Returns the status now stored.
    pub async fn set_status(&self, page_id: Uuid, to: SyncStatus) -> Result<SyncStatus> {
        let page = self
            .store
            .get_page(page_id)
            .await?
            .ok_or(CoreError::PageNotFound(page_id))?;

        let from = page.sync_status();
        if from == to {
            return Ok(to);
        }
        if !from.can_transition_to(to) {
            return Err(CoreError::InvalidTransition { from, to });
        }

        let mut metadata = page.metadata;
        metadata.is_mem_synced = to;
        self.store.update_metadata(page_id, &metadata).await?;

        tracing::debug!(page_id = %page_id, %from, %to, "sync status changed");
        Ok(to)
    }

    /// Record a successful push of `pushed`. The page becomes `yes` only if
    /// its stored title and text still match what was sent; otherwise it is
    /// left `no` so the next pass pushes the newer content.
    pub async fn confirm_pushed(&self, pushed: &Page) -> Result<SyncStatus> {
        let clean = self
            .store
            .set_sync_status_if_unchanged(pushed.id, &pushed.title, &pushed.text, SyncStatus::Yes)
            .await?;
        if clean {
            return Ok(SyncStatus::Yes);
        }
        tracing::debug!(page_id = %pushed.id, "page changed during push, leaving dirty");
        self.set_status(pushed.id, SyncStatus::No).await
    }

    /// Mark an edited page dirty.
    pub async fn mark_dirty(&self, page_id: Uuid) -> Result<SyncStatus> {
        let page = self
            .store
            .get_page(page_id)
            .await?
            .ok_or(CoreError::PageNotFound(page_id))?;
        if page.is_folder() {
            return Ok(page.sync_status());
        }
        let next = page.sync_status().after_content_change();
        self.set_status(page_id, next).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::document::DocNode;
    use crate::page::store::SqlitePageStore;
    use crate::page::types::NewPage;

    fn tracker() -> (Arc<dyn PageStore>, SyncTracker) {
        let store: Arc<dyn PageStore> =
            Arc::new(SqlitePageStore::new(crate::db::open_memory_database().unwrap()));
        let tracker = SyncTracker::new(Arc::clone(&store));
        (store, tracker)
    }

    #[test]
    fn transitions_never_return_to_never() {
        assert!(SyncStatus::Never.can_transition_to(SyncStatus::No));
        assert!(SyncStatus::Never.can_transition_to(SyncStatus::Yes));
        assert!(SyncStatus::No.can_transition_to(SyncStatus::Yes));
        assert!(SyncStatus::Yes.can_transition_to(SyncStatus::No));
        assert!(!SyncStatus::Yes.can_transition_to(SyncStatus::Never));
        assert!(!SyncStatus::No.can_transition_to(SyncStatus::Never));
    }

    #[test]
    fn content_change_keeps_never() {
        assert_eq!(SyncStatus::Never.after_content_change(), SyncStatus::Never);
        assert_eq!(SyncStatus::Yes.after_content_change(), SyncStatus::No);
        assert_eq!(SyncStatus::No.after_content_change(), SyncStatus::No);
        assert!(SyncStatus::Never.needs_sync());
        assert!(!SyncStatus::Yes.needs_sync());
    }

    #[tokio::test]
    async fn set_status_preserves_concurrent_metadata() {
        let (store, tracker) = tracker();
        let page = store
            .create_page(NewPage::file("p", DocNode::from_plain_text("x")))
            .await
            .unwrap();

        // Another writer tags the page after our copy was taken.
        let mut meta = store.get_page(page.id).await.unwrap().unwrap().metadata;
        meta.organize_status = Some(OrganizeStatus::Other("done".into()));
        store.update_metadata(page.id, &meta).await.unwrap();

        tracker.set_status(page.id, SyncStatus::Yes).await.unwrap();

        let fresh = store.get_page(page.id).await.unwrap().unwrap();
        assert_eq!(fresh.sync_status(), SyncStatus::Yes);
        assert_eq!(
            fresh.metadata.organize_status,
            Some(OrganizeStatus::Other("done".into()))
        );
    }

    #[tokio::test]
    async fn set_status_rejects_regression_to_never() {
        let (store, tracker) = tracker();
        let page = store
            .create_page(NewPage::file("p", DocNode::default()))
            .await
            .unwrap();
        tracker.set_status(page.id, SyncStatus::Yes).await.unwrap();
        let err = tracker.set_status(page.id, SyncStatus::Never).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn eligibility_excludes_folders_and_unorganized() {
        let (store, _) = tracker();
        let folder = store.create_page(NewPage::folder("f")).await.unwrap();
        assert!(!is_eligible(&folder));

        let mut file = store
            .create_page(NewPage::file("f", DocNode::from_plain_text("x")))
            .await
            .unwrap();
        assert!(is_eligible(&file));

        file.metadata.organize_status = Some(OrganizeStatus::Soon);
        assert!(!is_eligible(&file));

        file.metadata.organize_status = None;
        file.organized = false;
        assert!(!is_eligible(&file));
    }
}
