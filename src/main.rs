mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use notesync::config::NotesyncConfig;

#[derive(Parser)]
#[command(name = "notesync", version, about = "Semantic sync for note pages")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Push every page whose content is not yet in the semantic index
    Sync,
    /// Show page counts by sync status
    Status,
    /// Mark a page as changed so the next sync updates it
    Mark {
        /// Page UUID
        page_id: Uuid,
    },
    /// Search the semantic index
    Search {
        query: String,
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = NotesyncConfig::load()?;

    // Log to stderr so stdout stays clean for command output.
    let filter =
        EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Sync => cli::sync::sync(&config).await?,
        Command::Status => cli::status::status(&config).await?,
        Command::Mark { page_id } => cli::mark(&config, page_id).await?,
        Command::Search { query, limit } => cli::search::search(&config, &query, limit).await?,
    }

    Ok(())
}
