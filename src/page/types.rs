//! Core page type definitions.
//!
//! Defines [`PageKind`] (file or folder), [`SyncStatus`] (the three-state
//! semantic-index tracking), [`OrganizeStatus`], [`PageMetadata`] (the typed
//! form of the `metadata` column) and [`Page`] (a full record).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::DocNode;

/// Whether a page holds content or other pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    File,
    Folder,
}

impl PageKind {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Folder => "folder",
        }
    }
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "folder" => Ok(Self::Folder),
            _ => Err(format!("unknown page type: {s}")),
        }
    }
}

/// Semantic-index sync status, persisted as `isMemSynced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Never pushed to the index.
    #[default]
    Never,
    /// Pushed before, content changed since.
    No,
    /// Index holds the current content.
    Yes,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::No => "no",
            Self::Yes => "yes",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(Self::Never),
            "no" => Ok(Self::No),
            "yes" => Ok(Self::Yes),
            _ => Err(format!("unknown sync status: {s}")),
        }
    }
}

/// Auto-organization state, persisted as `organizeStatus`.
///
/// Only `soon` carries meaning for the core; any other value is kept verbatim
/// so writing the metadata back never loses what another client stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrganizeStatus {
    /// Queued for auto-organization; not ready for indexing.
    Soon,
    Other(String),
}

impl From<String> for OrganizeStatus {
    fn from(s: String) -> Self {
        if s == "soon" {
            Self::Soon
        } else {
            Self::Other(s)
        }
    }
}

impl From<OrganizeStatus> for String {
    fn from(status: OrganizeStatus) -> Self {
        match status {
            OrganizeStatus::Soon => "soon".into(),
            OrganizeStatus::Other(s) => s,
        }
    }
}

/// Typed view of the page `metadata` JSON column.
///
/// Wire keys stay camelCase for compatibility with records written by other
/// clients. Keys this crate does not know about are carried in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organize_status: Option<OrganizeStatus>,
    /// Absent in legacy records; reads as [`SyncStatus::Never`].
    #[serde(default)]
    pub is_mem_synced: SyncStatus,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PageMetadata {
    /// Metadata for a freshly created page of the given kind.
    pub fn for_new_page(kind: PageKind) -> Self {
        Self {
            is_folder: kind == PageKind::Folder,
            ..Self::default()
        }
    }
}

/// A page record, matching the `pages` table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// UUID v7 primary key.
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: PageKind,
    /// Containing folder, `None` at the root.
    pub parent_id: Option<Uuid>,
    /// Structured document.
    pub content: DocNode,
    /// Plain-text projection of `content`.
    pub text: String,
    pub organized: bool,
    pub metadata: PageMetadata,
    /// Soft-delete flag. Deleted pages stay in the table.
    pub deleted: bool,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-modification timestamp.
    pub updated_at: String,
}

impl Page {
    /// True for folders, checking both the column and the redundant metadata flag.
    pub fn is_folder(&self) -> bool {
        self.kind == PageKind::Folder || self.metadata.is_folder
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.metadata.is_mem_synced
    }

    /// Compares the user-visible state of two records, ignoring timestamps and
    /// the sync/organize bookkeeping the background workers own.
    pub fn same_state(&self, other: &Page) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.kind == other.kind
            && self.parent_id == other.parent_id
            && self.content == other.content
            && self.organized == other.organized
            && self.deleted == other.deleted
    }
}

/// Input for creating a page.
#[derive(Debug, Clone)]
pub struct NewPage {
    pub title: String,
    pub kind: PageKind,
    pub parent_id: Option<Uuid>,
    pub content: DocNode,
    pub organized: bool,
}

impl NewPage {
    pub fn file(title: impl Into<String>, content: DocNode) -> Self {
        Self {
            title: title.into(),
            kind: PageKind::File,
            parent_id: None,
            content,
            organized: true,
        }
    }

    pub fn folder(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind: PageKind::Folder,
            parent_id: None,
            content: DocNode::doc(Vec::new()),
            organized: true,
        }
    }

    pub fn in_folder(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}
