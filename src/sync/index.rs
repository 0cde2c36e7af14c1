//! Client contract for the hosted semantic index.
//!
//! [`SemanticIndex`] is what the sync engine calls; [`HttpSemanticIndex`]
//! talks to a bearer-token REST service. The service is eventually consistent
//! and rate-limited, so callers treat every call as fallible.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::IndexConfig;
use crate::error::{CoreError, Result};

/// Metadata attached to every indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub page_id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
    pub score: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Store a new document. Returns the index's document ID.
    async fn add(&self, content: &str, metadata: &DocumentMetadata) -> Result<String>;

    async fn update(&self, id: &str, content: &str, metadata: &DocumentMetadata) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn search(&self, query: &str, limit: usize, tags: Option<&[String]>)
        -> Result<Vec<SearchHit>>;
}

/// REST implementation of [`SemanticIndex`].
#[derive(Debug, Clone)]
pub struct HttpSemanticIndex {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    container_tag: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentBody<'a> {
    content: &'a str,
    metadata: &'a DocumentMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    container_tags: Option<Vec<&'a str>>,
}

#[derive(Deserialize)]
struct AddResponse {
    id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody<'a> {
    q: &'a str,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    container_tags: Option<Vec<&'a str>>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

impl HttpSemanticIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(CoreError::MissingField("index.api_key"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            container_tag: config.container_tag.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn tags(&self) -> Option<Vec<&str>> {
        self.container_tag.as_deref().map(|t| vec![t])
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Index(format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl SemanticIndex for HttpSemanticIndex {
    async fn add(&self, content: &str, metadata: &DocumentMetadata) -> Result<String> {
        let body = DocumentBody {
            content,
            metadata,
            container_tags: self.tags(),
        };
        let response = self
            .send(self.client.post(self.url("/v3/documents")).json(&body))
            .await?;
        let parsed: AddResponse = response.json().await?;
        if parsed.id.is_empty() {
            return Err(CoreError::Index("add returned an empty document id".into()));
        }
        Ok(parsed.id)
    }

    async fn update(&self, id: &str, content: &str, metadata: &DocumentMetadata) -> Result<()> {
        let body = DocumentBody {
            content,
            metadata,
            container_tags: self.tags(),
        };
        self.send(
            self.client
                .patch(self.url(&format!("/v3/documents/{id}")))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.send(self.client.delete(self.url(&format!("/v3/documents/{id}"))))
            .await?;
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        tags: Option<&[String]>,
    ) -> Result<Vec<SearchHit>> {
        let container_tags = match tags {
            Some(tags) => Some(tags.iter().map(String::as_str).collect()),
            None => self.tags(),
        };
        let body = SearchBody {
            q: query,
            limit,
            container_tags,
        };
        let response = self
            .send(self.client.post(self.url("/v3/search")).json(&body))
            .await?;
        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.results)
    }
}
