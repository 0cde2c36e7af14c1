use anyhow::Result;

use notesync::config::NotesyncConfig;
use notesync::page::store::PageStore;
use notesync::page::types::SyncStatus;
use notesync::sync::status::is_eligible;

/// Display page counts by sync status in the terminal.
pub async fn status(config: &NotesyncConfig) -> Result<()> {
    let store = super::open_store(config)?;
    let pages = store.list_pages().await?;

    let folders = pages.iter().filter(|p| p.is_folder()).count();
    let eligible: Vec<_> = pages.iter().filter(|p| is_eligible(p)).collect();
    let count = |status: SyncStatus| eligible.iter().filter(|p| p.sync_status() == status).count();

    println!("Page Sync Status");
    println!("{}", "=".repeat(40));
    println!("  Total pages:         {}", pages.len());
    println!("  Folders:             {folders}");
    println!("  Not ready:           {}", pages.len() - folders - eligible.len());
    println!();

    println!("Indexable pages:");
    for status in [SyncStatus::Never, SyncStatus::No, SyncStatus::Yes] {
        println!("  {:<12} {}", status.as_str(), count(status));
    }

    Ok(())
}
