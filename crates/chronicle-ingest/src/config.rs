//! Ingestion configuration loaded from environment variables.

use std::path::PathBuf;

/// Environment variable naming the SQLite database file.
pub const DB_PATH_ENV: &str = "DEDUPLICATION_DB_PATH";

/// Database file used when [`DB_PATH_ENV`] is unset.
pub const DEFAULT_DB_PATH: &str = ".chronicle.db";

/// Configuration for the ingestion core.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Path to the SQLite database holding dedup state.
    pub db_path: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `DEDUPLICATION_DB_PATH`: SQLite database path (default: ".chronicle.db")
    pub fn from_env() -> Self {
        let db_path = std::env::var(DB_PATH_ENV)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        tracing::info!(db_path = %db_path.display(), "ingest configuration loaded");

        Self { db_path }
    }
}
