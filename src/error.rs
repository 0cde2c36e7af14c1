//! Error types for the notesync core.
//!
//! Every boundary with an external collaborator (relational store, semantic
//! index, text generation) maps its failures into [`CoreError`].

use thiserror::Error;
use uuid::Uuid;

use crate::page::types::SyncStatus;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("semantic index error: {0}")]
    Index(String),

    #[error("text generation error: {0}")]
    Generation(String),

    #[error("page not found: {0}")]
    PageNotFound(Uuid),

    #[error("invalid parent {parent} for page {page}: {reason}")]
    InvalidParent {
        page: Uuid,
        parent: Uuid,
        reason: &'static str,
    },

    #[error("moving page {page} under {parent} would create a cycle")]
    Cycle { page: Uuid, parent: Uuid },

    #[error("invalid sync status transition {from} -> {to}")]
    InvalidTransition { from: SyncStatus, to: SyncStatus },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        CoreError::Task(e.to_string())
    }
}

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
