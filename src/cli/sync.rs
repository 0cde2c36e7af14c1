use std::sync::Arc;

use anyhow::{Context, Result};

use notesync::config::NotesyncConfig;
use notesync::sync::index::HttpSemanticIndex;
use notesync::sync::SemanticSync;

/// Run one sync pass over every pending page and print the outcome.
pub async fn sync(config: &NotesyncConfig) -> Result<()> {
    let store = super::open_store(config)?;
    let index = HttpSemanticIndex::new(&config.index).context("semantic index not configured")?;
    let engine = SemanticSync::new(store, Arc::new(index), config.sync.clone());

    let report = engine
        .sync_pending_from_store()
        .await
        .context("failed to load pages")?;

    println!("Semantic Sync");
    println!("{}", "=".repeat(40));
    println!("  Pending pages:       {}", report.attempted);
    println!("  Synced:              {}", report.succeeded);
    println!("  Failed:              {}", report.failed);
    println!("  Batches:             {}", report.batches.len());

    if report.failed > 0 {
        println!();
        println!("Failed pages stay pending and are retried on the next run.");
    }
    Ok(())
}
