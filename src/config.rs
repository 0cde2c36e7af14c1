use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct NotesyncConfig {
    pub log: LogConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
    pub index: IndexConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

/// Batching knobs for the semantic sync engine.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub batch_size: usize,
    pub batch_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// Unconfirmed optimistic writes older than this are dropped on reconcile.
    pub stale_pending_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    pub base_url: String,
    pub api_key: String,
    /// Tag attached to every document so searches stay within this workspace.
    pub container_tag: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_notesync_dir()
            .join("pages.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            batch_delay_ms: 500,
        }
    }
}

impl SyncConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_pending_secs: 30,
        }
    }
}

impl CacheConfig {
    /// Stale timeout as a chrono duration, or `None` if it does not fit one.
    pub fn stale_after(&self) -> Option<chrono::Duration> {
        i64::try_from(self.stale_pending_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.supermemory.ai".into(),
            api_key: String::new(),
            container_tag: None,
            timeout_secs: 30,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
            timeout_secs: 60,
        }
    }
}

/// Returns `~/.notesync/`
pub fn default_notesync_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".notesync")
}

/// Returns the default config file path: `~/.notesync/config.toml`
pub fn default_config_path() -> PathBuf {
    default_notesync_dir().join("config.toml")
}

impl NotesyncConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            NotesyncConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (NOTESYNC_DB, NOTESYNC_LOG_LEVEL,
    /// NOTESYNC_INDEX_API_KEY, NOTESYNC_GENERATION_API_KEY).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NOTESYNC_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("NOTESYNC_LOG_LEVEL") {
            self.log.level = val;
        }
        if let Ok(val) = std::env::var("NOTESYNC_INDEX_API_KEY") {
            self.index.api_key = val;
        }
        if let Ok(val) = std::env::var("NOTESYNC_GENERATION_API_KEY") {
            self.generation.api_key = val;
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.sync.batch_size > 0, "sync.batch_size must be at least 1");
        anyhow::ensure!(
            self.cache.stale_after().is_some(),
            "cache.stale_pending_secs is out of range: {}",
            self.cache.stale_pending_secs
        );
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
