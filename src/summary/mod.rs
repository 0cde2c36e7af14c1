//! Incremental summary maintenance.
//!
//! Notes grow at the top: new content is written above what was there. The
//! updater compares the text of the last summarized snapshot with the current
//! one and, when the old text is a suffix of the new, asks the generator to
//! fold only the added prefix into the existing summary. Edits anywhere else
//! leave the summary as it is.

pub mod generation;

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::page::document::DocNode;

use generation::{ChatMessage, TextGenerator};

/// Delta between two text snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ContentDiff {
    pub has_changes: bool,
    /// Text prepended since the old snapshot; empty when `has_changes` is false.
    pub added_text: String,
}

/// Diff two plain-text projections.
///
/// Only pure prepends count as changes: the old text must survive unchanged
/// as the tail of the new text.
pub fn compute_diff(old_text: &str, new_text: &str) -> ContentDiff {
    if old_text == new_text {
        return ContentDiff::default();
    }
    match new_text.strip_suffix(old_text) {
        Some(added) if !added.is_empty() => ContentDiff {
            has_changes: true,
            added_text: added.to_string(),
        },
        _ => ContentDiff::default(),
    }
}

/// Result of [`SummaryUpdater::update_page_summary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryUpdate {
    pub summary: DocNode,
    /// False when the existing summary was returned untouched.
    pub regenerated: bool,
}

const SYSTEM_PROMPT: &str = "You maintain a running summary of a user's note. \
You receive the current summary and text that was just added to the top of the note. \
Return the updated summary as a single JSON document in this exact shape: \
{\"type\":\"doc\",\"content\":[{\"type\":\"paragraph\",\"content\":[{\"type\":\"text\",\"text\":\"...\"}]}]}. \
Use paragraph, heading, bulletList and listItem nodes only. Reply with the JSON and nothing else.";

pub struct SummaryUpdater {
    generator: Arc<dyn TextGenerator>,
}

impl SummaryUpdater {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Fold the text added between `old_content` and `new_content` into
    /// `current_summary`.
    ///
    /// Returns the current summary unchanged when nothing was prepended. A
    /// reply that is not a document is kept as a single paragraph. Only a
    /// failed generation call is an error.
    pub async fn update_page_summary(
        &self,
        old_content: &DocNode,
        new_content: &DocNode,
        current_summary: &DocNode,
    ) -> Result<SummaryUpdate> {
        let diff = compute_diff(&old_content.plain_text(), &new_content.plain_text());
        if !diff.has_changes {
            tracing::debug!("no prepended content, summary unchanged");
            return Ok(SummaryUpdate {
                summary: current_summary.clone(),
                regenerated: false,
            });
        }

        let messages = build_messages(&current_summary.plain_text(), &diff.added_text);
        let reply = self.generator.generate(&messages).await?;
        let summary = parse_summary(&reply);

        tracing::info!(
            added_chars = diff.added_text.len(),
            summary_chars = summary.plain_text().len(),
            "summary regenerated"
        );
        Ok(SummaryUpdate {
            summary,
            regenerated: true,
        })
    }
}

fn build_messages(current_summary: &str, added_text: &str) -> Vec<ChatMessage> {
    let summary = if current_summary.trim().is_empty() {
        "(empty)"
    } else {
        current_summary
    };
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Current summary:\n{summary}\n\nNewly added text:\n{}",
            added_text.trim_end()
        )),
    ]
}

/// Parse a generated reply as a `doc` node, tolerating a Markdown code fence.
/// Anything else becomes one paragraph holding the raw text.
pub fn parse_summary(reply: &str) -> DocNode {
    let body = strip_code_fence(reply.trim());
    match serde_json::from_str::<DocNode>(body) {
        Ok(doc) if doc.is_doc() => doc,
        Ok(_) | Err(_) => {
            tracing::warn!("generated summary is not a document, wrapping raw text");
            DocNode::doc(vec![DocNode::paragraph(reply.trim())])
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an info string such as `json` on the opening fence.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
