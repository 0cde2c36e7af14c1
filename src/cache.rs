//! Organization cache: the in-memory view of the page tree with optimistic
//! writes layered over server-confirmed state.
//!
//! One [`OrganizationCache`] is constructed per process and shared by `Arc`
//! with every consumer that needs it. All mutation goes through a single
//! internal lock; listeners run after the lock is released, so they observe
//! whole updates and may call back into the cache.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::events::{EventBus, FileTreeBus, FileTreeEvent, FileTreeEventKind, Subscription};
use crate::page::types::Page;

/// What an optimistic write does to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingAction {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEventKind {
    Insert,
    Update,
    Delete,
    Optimistic,
}

/// Notification sent to cache listeners.
#[derive(Debug, Clone, Serialize)]
pub struct CacheUpdateEvent {
    pub kind: CacheEventKind,
    pub pages: Vec<Page>,
    /// Cache version at emission time.
    pub version: u64,
}

/// An unconfirmed local write.
#[derive(Debug, Clone, Serialize)]
pub struct PendingUpdate {
    pub page: Page,
    pub action: PendingAction,
    pub applied_at: DateTime<Utc>,
}

/// Snapshot returned by [`OrganizationCache::get_state`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrganizationState {
    pub is_organizing: bool,
    pub cache_version: u64,
    pub last_organization: Option<DateTime<Utc>>,
    /// Ordered by first application; re-applying a page keeps its slot.
    pub pending_updates: Vec<PendingUpdate>,
}

impl OrganizationState {
    pub fn pending_for(&self, page_id: Uuid) -> Option<&PendingUpdate> {
        self.pending_updates.iter().find(|p| p.page.id == page_id)
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub confirmed: Vec<Uuid>,
    pub still_pending: Vec<Uuid>,
    pub dropped: Vec<Uuid>,
}

struct Inner {
    state: OrganizationState,
    /// Server-confirmed pages in server order.
    confirmed: Vec<Page>,
}

/// An event queued under the state lock, delivered after it is released.
enum Outgoing {
    Cache(CacheUpdateEvent),
    FileTree(FileTreeEvent),
}

pub struct OrganizationCache {
    inner: Mutex<Inner>,
    listeners: EventBus<CacheUpdateEvent>,
    file_tree: Option<Arc<FileTreeBus>>,
    stale_after: chrono::Duration,
    /// Events in version order. Filled while `inner` is held.
    outbox: Mutex<VecDeque<Outgoing>>,
    /// Held by whichever caller is currently draining `outbox`.
    dispatching: Mutex<()>,
}

impl OrganizationCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: OrganizationState::default(),
                confirmed: Vec::new(),
            }),
            listeners: EventBus::new(),
            file_tree: None,
            stale_after: config.stale_after().unwrap_or(chrono::Duration::MAX),
            outbox: Mutex::new(VecDeque::new()),
            dispatching: Mutex::new(()),
        }
    }

    /// Also publish inserts and deletes on the given file-tree bus.
    pub fn with_file_tree(mut self, bus: Arc<FileTreeBus>) -> Self {
        self.file_tree = Some(bus);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn outbox(&self) -> MutexGuard<'_, VecDeque<Outgoing>> {
        self.outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deliver queued events in the order they were queued.
    ///
    /// Only one caller drains at a time. A caller that finds another drain in
    /// progress (including a listener calling back into the cache) leaves its
    /// events for that drain to deliver.
    fn flush(&self) {
        loop {
            let draining = match self.dispatching.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => return,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            };
            loop {
                // Pop in its own statement so the outbox lock is not held
                // while listeners run.
                let next = self.outbox().pop_front();
                let Some(event) = next else { break };
                match event {
                    Outgoing::Cache(event) => {
                        self.listeners.publish(&event);
                    }
                    Outgoing::FileTree(event) => {
                        if let Some(bus) = &self.file_tree {
                            bus.publish(&event);
                        }
                    }
                }
            }
            drop(draining);
            // Another caller may have queued after our last pop but before we
            // released the drain lock.
            if self.outbox().is_empty() {
                return;
            }
        }
    }

    pub fn get_state(&self) -> OrganizationState {
        self.lock().state.clone()
    }

    /// Apply local writes ahead of server confirmation.
    ///
    /// Each page replaces any pending entry with the same ID, so re-applying
    /// the same write collapses to one entry. The version advances by one per
    /// call. Listeners see events in version order across threads; an event
    /// may be delivered by a concurrent caller after this returns.
    pub fn optimistic_update(&self, pages: Vec<Page>, action: PendingAction) -> u64 {
        let now = Utc::now();
        let count = pages.len();
        let version = {
            let mut inner = self.lock();
            for page in &pages {
                let entry = PendingUpdate {
                    page: page.clone(),
                    action,
                    applied_at: now,
                };
                let pending = &mut inner.state.pending_updates;
                match pending.iter().position(|p| p.page.id == page.id) {
                    Some(i) => pending[i] = entry,
                    None => pending.push(entry),
                }
            }
            inner.state.cache_version += 1;
            let version = inner.state.cache_version;

            let mut outbox = self.outbox();
            let tree_kind = match action {
                PendingAction::Create => Some(FileTreeEventKind::Insert),
                PendingAction::Delete => Some(FileTreeEventKind::Delete),
                PendingAction::Update => None,
            };
            if let (Some(kind), Some(_)) = (tree_kind, &self.file_tree) {
                for page in &pages {
                    outbox.push_back(Outgoing::FileTree(FileTreeEvent {
                        kind,
                        page: page.clone(),
                    }));
                }
            }
            outbox.push_back(Outgoing::Cache(CacheUpdateEvent {
                kind: CacheEventKind::Optimistic,
                pages,
                version,
            }));
            version
        };

        tracing::debug!(count, ?action, version, "optimistic update applied");
        self.flush();
        version
    }

    /// Forget all unconfirmed writes. The version is left alone.
    pub fn clear_pending_updates(&self) {
        let mut inner = self.lock();
        let dropped = inner.state.pending_updates.len();
        inner.state.pending_updates.clear();
        inner.state.is_organizing = false;
        tracing::debug!(dropped, "pending updates cleared");
    }

    #[must_use = "dropping the subscription unregisters the listener"]
    pub fn on_cache_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CacheUpdateEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    /// Explicit form of dropping the handle.
    pub fn remove_cache_listener(&self, subscription: Subscription) -> bool {
        subscription.unsubscribe()
    }

    pub fn set_organizing(&self, organizing: bool) {
        self.lock().state.is_organizing = organizing;
    }

    pub fn reconcile(&self, server_pages: Vec<Page>) -> ReconcileReport {
        self.reconcile_at(server_pages, Utc::now())
    }

    /// Match pending writes against a fresh server listing.
    ///
    /// Pending entries the server already reflects are removed. Mismatches stay
    /// and keep `is_organizing` set until they match or grow older than the
    /// stale timeout, at which point they are dropped.
    pub fn reconcile_at(&self, server_pages: Vec<Page>, now: DateTime<Utc>) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        {
            let mut inner = self.lock();
            let by_id: HashMap<Uuid, &Page> = server_pages.iter().map(|p| (p.id, p)).collect();

            let mut kept = Vec::with_capacity(inner.state.pending_updates.len());
            let mut dropped_pages = Vec::new();
            for pending in inner.state.pending_updates.drain(..) {
                let id = pending.page.id;
                if is_confirmed(&pending, by_id.get(&id).copied()) {
                    report.confirmed.push(id);
                } else if now - pending.applied_at > self.stale_after {
                    tracing::warn!(
                        page_id = %id,
                        action = ?pending.action,
                        applied_at = %pending.applied_at,
                        "dropping stale optimistic update the server never confirmed"
                    );
                    report.dropped.push(id);
                    // The server copy is the rollback target; without one,
                    // listeners get the dropped write so they can undo it.
                    dropped_pages.push(match by_id.get(&id) {
                        Some(server) => (*server).clone(),
                        None => pending.page,
                    });
                } else {
                    report.still_pending.push(id);
                    kept.push(pending);
                }
            }
            inner.state.pending_updates = kept;
            drop(by_id);
            inner.confirmed = server_pages;

            if inner.state.pending_updates.is_empty() {
                inner.state.is_organizing = false;
                inner.state.last_organization = Some(now);
            } else {
                inner.state.is_organizing = true;
            }

            if !report.confirmed.is_empty() || !report.dropped.is_empty() {
                inner.state.cache_version += 1;
                let mut touched: Vec<Page> = report
                    .confirmed
                    .iter()
                    .filter_map(|id| inner.confirmed.iter().find(|p| p.id == *id).cloned())
                    .collect();
                touched.extend(dropped_pages);
                self.outbox().push_back(Outgoing::Cache(CacheUpdateEvent {
                    kind: CacheEventKind::Update,
                    pages: touched,
                    version: inner.state.cache_version,
                }));
            }
        }

        tracing::debug!(
            confirmed = report.confirmed.len(),
            pending = report.still_pending.len(),
            dropped = report.dropped.len(),
            "reconciled against server"
        );

        self.flush();
        report
    }

    /// The optimistic view: confirmed pages with pending writes applied.
    pub fn pages(&self) -> Vec<Page> {
        let inner = self.lock();
        let pending: HashMap<Uuid, &PendingUpdate> = inner
            .state
            .pending_updates
            .iter()
            .map(|p| (p.page.id, p))
            .collect();

        let mut out: Vec<Page> = inner
            .confirmed
            .iter()
            .filter_map(|page| match pending.get(&page.id) {
                Some(p) if p.action == PendingAction::Delete => None,
                Some(p) => Some(p.page.clone()),
                None => Some(page.clone()),
            })
            .filter(|page| !page.deleted)
            .collect();

        for p in &inner.state.pending_updates {
            if p.action != PendingAction::Delete && !out.iter().any(|page| page.id == p.page.id) {
                out.push(p.page.clone());
            }
        }
        out
    }
}

/// A create/update is confirmed when the server holds the same state; a delete
/// when the server no longer lists the page or lists it as deleted.
fn is_confirmed(pending: &PendingUpdate, server: Option<&Page>) -> bool {
    match (pending.action, server) {
        (PendingAction::Delete, None) => true,
        (PendingAction::Delete, Some(page)) => page.deleted,
        (_, Some(page)) => page.same_state(&pending.page),
        (_, None) => false,
    }
}
