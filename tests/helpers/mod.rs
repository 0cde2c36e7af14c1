#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use notesync::config::SyncConfig;
use notesync::db;
use notesync::error::{CoreError, Result};
use notesync::page::document::DocNode;
use notesync::page::store::{PageStore, SqlitePageStore};
use notesync::page::types::{NewPage, Page};
use notesync::summary::generation::{ChatMessage, TextGenerator};
use notesync::sync::index::{DocumentMetadata, SearchHit, SemanticIndex};

/// Fresh in-memory store with schema and migrations applied.
pub fn test_store() -> Arc<dyn PageStore> {
    let conn = db::open_memory_database().unwrap();
    Arc::new(SqlitePageStore::new(conn))
}

/// Sync config with a short inter-batch delay so tests stay fast.
pub fn fast_sync_config() -> SyncConfig {
    SyncConfig {
        batch_size: 3,
        batch_delay_ms: 20,
    }
}

/// Create a file page whose content is one paragraph per line of `text`.
pub async fn create_file(store: &Arc<dyn PageStore>, title: &str, text: &str) -> Page {
    store
        .create_page(NewPage::file(title, DocNode::from_plain_text(text)))
        .await
        .unwrap()
}

pub async fn reload(store: &Arc<dyn PageStore>, page: &Page) -> Page {
    store.get_page(page.id).await.unwrap().unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOp {
    Add,
    Update(String),
    Delete(String),
}

#[derive(Debug, Clone)]
pub struct IndexCall {
    pub op: IndexOp,
    pub title: String,
    pub content: String,
    pub started: Instant,
    pub finished: Instant,
}

/// In-process [`SemanticIndex`] that records every call.
pub struct MockIndex {
    latency: Duration,
    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    failing_titles: Mutex<HashSet<String>>,
    calls: Mutex<Vec<IndexCall>>,
    documents: Mutex<HashMap<String, String>>,
}

impl MockIndex {
    pub fn new() -> Self {
        Self::with_latency(Duration::from_millis(10))
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            next_id: AtomicUsize::new(1),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            failing_titles: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// Make every push for pages with this title fail.
    pub fn fail_title(&self, title: &str) {
        self.failing_titles.lock().unwrap().insert(title.to_string());
    }

    pub fn heal_title(&self, title: &str) {
        self.failing_titles.lock().unwrap().remove(title);
    }

    pub fn calls(&self) -> Vec<IndexCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn document(&self, id: &str) -> Option<String> {
        self.documents.lock().unwrap().get(id).cloned()
    }

    pub fn document_count(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    async fn call(&self, op: IndexOp, title: &str, content: &str) -> Result<()> {
        let started = Instant::now();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(IndexCall {
            op,
            title: title.to_string(),
            content: content.to_string(),
            started,
            finished: Instant::now(),
        });

        if self.failing_titles.lock().unwrap().contains(title) {
            return Err(CoreError::Index(format!("simulated failure for {title}")));
        }
        Ok(())
    }
}

#[async_trait]
impl SemanticIndex for MockIndex {
    async fn add(&self, content: &str, metadata: &DocumentMetadata) -> Result<String> {
        self.call(IndexOp::Add, &metadata.title, content).await?;
        let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.documents
            .lock()
            .unwrap()
            .insert(id.clone(), content.to_string());
        Ok(id)
    }

    async fn update(&self, id: &str, content: &str, metadata: &DocumentMetadata) -> Result<()> {
        self.call(IndexOp::Update(id.to_string()), &metadata.title, content)
            .await?;
        let mut docs = self.documents.lock().unwrap();
        match docs.get_mut(id) {
            Some(doc) => {
                *doc = content.to_string();
                Ok(())
            }
            None => Err(CoreError::Index(format!("unknown document {id}"))),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.call(IndexOp::Delete(id.to_string()), "", "").await?;
        self.documents.lock().unwrap().remove(id);
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        _tags: Option<&[String]>,
    ) -> Result<Vec<SearchHit>> {
        let docs = self.documents.lock().unwrap();
        let mut hits: Vec<SearchHit> = docs
            .iter()
            .filter(|(_, content)| content.contains(query))
            .map(|(id, content)| SearchHit {
                id: id.clone(),
                content: content.clone(),
                title: None,
                score: 1.0,
                metadata: serde_json::Value::Null,
            })
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// [`TextGenerator`] that replays queued replies and records prompts.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CoreError::Generation("no scripted reply".into())))
    }
}
