use anyhow::{Context, Result};

use notesync::config::NotesyncConfig;
use notesync::sync::index::{HttpSemanticIndex, SemanticIndex};

/// Query the semantic index and print ranked hits.
pub async fn search(config: &NotesyncConfig, query: &str, limit: usize) -> Result<()> {
    let index = HttpSemanticIndex::new(&config.index).context("semantic index not configured")?;
    let hits = index
        .search(query, limit, None)
        .await
        .with_context(|| format!("search failed for {query:?}"))?;

    if hits.is_empty() {
        println!("No results for \"{query}\"");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let title = hit.title.as_deref().unwrap_or("(untitled)");
        println!("{:>2}. [{:.3}] {title}", i + 1, hit.score);
        println!("    {}", preview(&hit.content, 100));
    }
    Ok(())
}

fn preview(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
