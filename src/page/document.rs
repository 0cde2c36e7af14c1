//! Structured document tree stored in the page `content` column.
//!
//! Documents are ProseMirror-style JSON: a `doc` root holding block nodes
//! (paragraph, heading, lists, ...) whose leaves are `text` nodes.
//! [`DocNode::plain_text`] produces the flattened projection used for the
//! `text` column, sync payloads and summary diffs.

use serde::{Deserialize, Serialize};

/// Node types whose children render on a single line.
const TEXT_BLOCKS: &[&str] = &["paragraph", "heading", "codeBlock", "title"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocNode {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<DocNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<serde_json::Value>,
}

impl DocNode {
    fn node(node_type: &str, content: Vec<DocNode>) -> Self {
        Self {
            node_type: node_type.into(),
            text: None,
            content,
            attrs: None,
            marks: Vec::new(),
        }
    }

    pub fn doc(content: Vec<DocNode>) -> Self {
        Self::node("doc", content)
    }

    pub fn paragraph(text: &str) -> Self {
        let content = if text.is_empty() {
            Vec::new()
        } else {
            vec![Self::text(text)]
        };
        Self::node("paragraph", content)
    }

    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::node("text", Vec::new())
        }
    }

    /// Build a document with one paragraph per line of `text`.
    pub fn from_plain_text(text: &str) -> Self {
        if text.is_empty() {
            return Self::doc(Vec::new());
        }
        Self::doc(text.split('\n').map(Self::paragraph).collect())
    }

    pub fn is_doc(&self) -> bool {
        self.node_type == "doc"
    }

    /// Flattened plain-text projection: one line per text block, `hardBreak`
    /// as a newline, container blocks recursed in order.
    pub fn plain_text(&self) -> String {
        let mut lines = Vec::new();
        self.collect_lines(&mut lines);
        lines.join("\n")
    }

    fn collect_lines(&self, lines: &mut Vec<String>) {
        match self.node_type.as_str() {
            "text" => lines.push(self.text.clone().unwrap_or_default()),
            "hardBreak" => lines.push(String::new()),
            t if TEXT_BLOCKS.contains(&t) || self.is_inline_only() => {
                lines.push(self.inline_text());
            }
            _ => {
                for child in &self.content {
                    child.collect_lines(lines);
                }
            }
        }
    }

    fn is_inline_only(&self) -> bool {
        !self.content.is_empty()
            && self
                .content
                .iter()
                .all(|c| matches!(c.node_type.as_str(), "text" | "hardBreak"))
    }

    fn inline_text(&self) -> String {
        let mut out = String::new();
        for child in &self.content {
            match child.node_type.as_str() {
                "text" => out.push_str(child.text.as_deref().unwrap_or_default()),
                "hardBreak" => out.push('\n'),
                _ => out.push_str(&child.inline_text()),
            }
        }
        out
    }
}

impl Default for DocNode {
    fn default() -> Self {
        Self::doc(Vec::new())
    }
}
