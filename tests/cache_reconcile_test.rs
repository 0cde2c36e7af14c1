mod helpers;

use std::sync::{Arc, Mutex};

use helpers::{create_file, test_store};
use notesync::cache::{CacheEventKind, OrganizationCache, PendingAction};
use notesync::config::CacheConfig;
use notesync::events::{FileTreeBus, FileTreeEventKind};
use notesync::page::types::NewPage;

#[tokio::test]
async fn optimistic_move_confirms_once_store_catches_up() {
    let store = test_store();
    let cache = OrganizationCache::new(&CacheConfig::default());

    let folder = store.create_page(NewPage::folder("Projects")).await.unwrap();
    let page = create_file(&store, "Plan", "step one").await;
    cache.reconcile(store.list_pages().await.unwrap());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = cache.on_cache_update(move |event| {
        sink.lock().unwrap().push((event.kind, event.version));
        Ok(())
    });

    let mut moved = page.clone();
    moved.parent_id = Some(folder.id);
    let version = cache.optimistic_update(vec![moved.clone()], PendingAction::Update);

    let view = cache.pages();
    let shown = view.iter().find(|p| p.id == page.id).unwrap();
    assert_eq!(shown.parent_id, Some(folder.id));

    // Server has not applied the move yet.
    let report = cache.reconcile(store.list_pages().await.unwrap());
    assert_eq!(report.still_pending, vec![page.id]);
    assert!(cache.get_state().is_organizing);
    assert_eq!(cache.get_state().cache_version, version);

    store.move_page(page.id, Some(folder.id)).await.unwrap();
    let report = cache.reconcile(store.list_pages().await.unwrap());
    assert_eq!(report.confirmed, vec![page.id]);

    let state = cache.get_state();
    assert!(state.pending_updates.is_empty());
    assert!(!state.is_organizing);
    assert!(state.last_organization.is_some());
    assert_eq!(state.cache_version, version + 1);

    let events = seen.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            (CacheEventKind::Optimistic, version),
            (CacheEventKind::Update, version + 1),
        ]
    );
}

#[tokio::test]
async fn optimistic_delete_hides_page_and_emits_tree_event() {
    let store = test_store();
    let bus = Arc::new(FileTreeBus::new());
    let cache = OrganizationCache::new(&CacheConfig::default()).with_file_tree(Arc::clone(&bus));

    let tree_events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&tree_events);
    let _tree_sub = bus.subscribe(move |event| {
        sink.lock().unwrap().push((event.kind, event.page.id));
        Ok(())
    });

    let keep = create_file(&store, "Keep", "a").await;
    let gone = create_file(&store, "Gone", "b").await;
    cache.reconcile(store.list_pages().await.unwrap());
    assert_eq!(cache.pages().len(), 2);

    cache.optimistic_update(vec![gone.clone()], PendingAction::Delete);
    let view: Vec<_> = cache.pages().into_iter().map(|p| p.id).collect();
    assert_eq!(view, vec![keep.id]);
    assert_eq!(
        *tree_events.lock().unwrap(),
        vec![(FileTreeEventKind::Delete, gone.id)]
    );

    store.soft_delete(gone.id).await.unwrap();
    let report = cache.reconcile(store.list_pages().await.unwrap());
    assert_eq!(report.confirmed, vec![gone.id]);
    assert_eq!(cache.pages().len(), 1);
}

#[tokio::test]
async fn repeated_optimistic_writes_keep_one_entry_per_page() {
    let store = test_store();
    let cache = OrganizationCache::new(&CacheConfig::default());

    let page = create_file(&store, "Draft", "x").await;
    let mut renamed = page.clone();
    renamed.title = "Draft v2".into();

    let v1 = cache.optimistic_update(vec![page.clone()], PendingAction::Update);
    let v2 = cache.optimistic_update(vec![renamed.clone()], PendingAction::Update);
    assert_eq!(v2, v1 + 1);

    let state = cache.get_state();
    assert_eq!(state.pending_updates.len(), 1);
    assert_eq!(state.pending_for(page.id).unwrap().page.title, "Draft v2");

    cache.clear_pending_updates();
    assert!(cache.get_state().pending_updates.is_empty());
    assert_eq!(cache.get_state().cache_version, v2);
}
