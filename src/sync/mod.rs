//! Background push of page content into the semantic index.
//!
//! [`SemanticSync`] drives eligible pages through the sync status machine:
//! `never` pages are added, `no` pages are updated by their mapped document
//! ID, and a successful push marks the page `yes`. Failures leave the status
//! alone so the next pass retries.

pub mod index;
pub mod status;

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::{CoreError, Result};
use crate::page::store::PageStore;
use crate::page::types::{Page, SyncStatus};

use index::{DocumentMetadata, SearchHit, SemanticIndex};
use status::{is_eligible, SyncTracker};

/// Summary of a [`SemanticSync::sync_all_pending`] pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Size of each batch, in processing order.
    pub batches: Vec<usize>,
}

pub struct SemanticSync {
    store: Arc<dyn PageStore>,
    index: Arc<dyn SemanticIndex>,
    tracker: SyncTracker,
    config: SyncConfig,
}

/// Title-prefixed text sent to the index so title matches rank higher.
pub fn enhanced_content(page: &Page) -> String {
    format!("Title: {}\n\n{}", page.title, page.text)
}

impl SemanticSync {
    pub fn new(store: Arc<dyn PageStore>, index: Arc<dyn SemanticIndex>, config: SyncConfig) -> Self {
        let tracker = SyncTracker::new(Arc::clone(&store));
        Self {
            store,
            index,
            tracker,
            config,
        }
    }

    pub fn tracker(&self) -> &SyncTracker {
        &self.tracker
    }

    /// Push one page. Returns false without side effects for ineligible pages
    /// and false after logging for any failure.
    pub async fn sync_page(&self, page: &Page) -> bool {
        if !is_eligible(page) || page.text.trim().is_empty() {
            tracing::trace!(page_id = %page.id, "page not eligible for sync");
            return false;
        }
        if !page.sync_status().needs_sync() {
            return true;
        }

        match self.push(page).await {
            Ok(status) => {
                tracing::info!(page_id = %page.id, %status, "page synced to semantic index");
                true
            }
            Err(e) => {
                tracing::warn!(page_id = %page.id, error = %e, "page sync failed");
                false
            }
        }
    }

    async fn push(&self, page: &Page) -> Result<SyncStatus> {
        let content = enhanced_content(page);
        let metadata = DocumentMetadata {
            page_id: page.id,
            title: page.title.clone(),
            parent_id: page.parent_id,
        };

        // A `never` page can already be mapped when an earlier add succeeded
        // but the status write did not; updating keeps the retry idempotent.
        match self.store.get_mapping(page.id).await? {
            Some(document_id) => {
                self.index.update(&document_id, &content, &metadata).await?;
            }
            None => {
                if page.sync_status() == SyncStatus::No {
                    tracing::warn!(page_id = %page.id, "dirty page has no document mapping, re-adding");
                }
                let document_id = self.index.add(&content, &metadata).await?;
                self.store.upsert_mapping(page.id, &document_id).await?;
            }
        }

        // The page may have been edited while the push was in flight.
        self.tracker.confirm_pushed(page).await
    }

    /// Push every eligible page whose status is `never` or `no`.
    ///
    /// Pages go out in batches of `batch_size`; a batch runs concurrently and
    /// the next one starts `batch_delay_ms` after it finishes.
    pub async fn sync_all_pending(&self, pages: &[Page]) -> SyncReport {
        let pending: Vec<&Page> = pages
            .iter()
            .filter(|p| is_eligible(p) && p.sync_status().needs_sync() && !p.text.trim().is_empty())
            .collect();

        let mut report = SyncReport {
            attempted: pending.len(),
            ..SyncReport::default()
        };
        if pending.is_empty() {
            tracing::debug!("no pages pending sync");
            return report;
        }

        let batch_size = self.config.batch_size.max(1);
        let total_batches = pending.len().div_ceil(batch_size);
        tracing::info!(pages = pending.len(), batches = total_batches, "starting semantic sync");

        for (i, batch) in pending.chunks(batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.batch_delay()).await;
            }

            let results = join_all(batch.iter().map(|page| self.sync_page(page))).await;
            let ok = results.iter().filter(|r| **r).count();
            report.succeeded += ok;
            report.failed += results.len() - ok;
            report.batches.push(batch.len());

            tracing::debug!(batch = i + 1, of = total_batches, ok, "batch finished");
        }

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "semantic sync finished"
        );
        report
    }

    /// Load the current page list from the store and sync what is pending.
    pub async fn sync_pending_from_store(&self) -> Result<SyncReport> {
        let pages = self.store.list_pages().await?;
        Ok(self.sync_all_pending(&pages).await)
    }

    /// Flag a page as changed since its last push.
    pub async fn mark_page_for_sync(&self, page_id: Uuid) -> Result<SyncStatus> {
        self.tracker.mark_dirty(page_id).await
    }

    /// Remove a page's document from the index and forget the mapping.
    /// Returns false if the page had no mapping or the index call failed.
    pub async fn remove_page(&self, page_id: Uuid) -> bool {
        let document_id = match self.store.get_mapping(page_id).await {
            Ok(Some(id)) => id,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(page_id = %page_id, error = %e, "mapping lookup failed");
                return false;
            }
        };

        if let Err(e) = self.index.delete(&document_id).await {
            tracing::warn!(page_id = %page_id, error = %e, "index delete failed");
            return false;
        }
        if let Err(e) = self.store.delete_mapping(page_id).await {
            tracing::warn!(page_id = %page_id, error = %e, "mapping delete failed");
            return false;
        }
        tracing::info!(page_id = %page_id, document_id = %document_id, "page removed from semantic index");
        true
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(CoreError::MissingField("query"));
        }
        self.index.search(query, limit, None).await
    }
}
