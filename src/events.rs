//! Typed publish/subscribe for structural change notifications.
//!
//! [`EventBus`] delivers each published event synchronously to every listener
//! registered at the time of the call, in registration order. Listener
//! failures (errors or panics) are logged and never reach the publisher.
//! [`Subscription`] handles unregister their listener when dropped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;

use crate::page::types::Page;

type Listener<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    listeners: Vec<(u64, Listener<E>)>,
}

impl<E> Registry<E> {
    fn remove(&mut self, id: u64) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }
}

pub struct EventBus<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register a listener. It stays registered until the returned handle is
    /// dropped or [`Subscription::unsubscribe`] is called.
    #[must_use = "dropping the subscription unregisters the listener"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(callback)));

        let weak: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.registry);
        Subscription {
            id,
            detach: Some(Box::new(move |id| match weak.upgrade() {
                Some(registry) => lock(&registry).remove(id),
                None => false,
            })),
        }
    }

    /// Deliver `event` to every current listener. Returns how many were invoked.
    pub fn publish(&self, event: &E) -> usize {
        // Snapshot so listeners can (un)subscribe while we iterate.
        let listeners: Vec<(u64, Listener<E>)> = lock(&self.registry).listeners.clone();

        for (id, listener) in &listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(listener = id, error = %e, "event listener failed");
                }
                Err(_) => {
                    tracing::error!(listener = id, "event listener panicked");
                }
            }
        }
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Recover the guard even if a listener panicked while another thread held it;
/// the registry is a plain list and stays consistent.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle for a registered listener.
pub struct Subscription {
    id: u64,
    detach: Option<Box<dyn FnOnce(u64) -> bool + Send + Sync>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Unregister now. Returns false if the listener or bus was already gone.
    pub fn unsubscribe(mut self) -> bool {
        self.detach.take().map(|f| f(self.id)).unwrap_or(false)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.detach.take() {
            f(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ── File tree events ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileTreeEventKind {
    Insert,
    Delete,
}

/// A page appeared in or disappeared from the tree.
#[derive(Debug, Clone, Serialize)]
pub struct FileTreeEvent {
    pub kind: FileTreeEventKind,
    pub page: Page,
}

pub type FileTreeBus = EventBus<FileTreeEvent>;
