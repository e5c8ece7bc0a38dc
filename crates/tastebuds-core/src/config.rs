//! Configuration and data directory management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 3004;
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 16;
pub const DEFAULT_FREE_PROJECT_LIMIT: i64 = 3;
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

/// Paths to all Tastebuds data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// SQLite database directory (`data/db/`).
    pub db: PathBuf,
    /// Generated documents (`data/artifacts/`).
    pub artifacts: PathBuf,
    /// Provider configuration (`data/provider-config.json`).
    pub provider_config_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            db: root.join("db"),
            artifacts: root.join("artifacts"),
            provider_config_file: root.join("provider-config.json"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.db)?;
        std::fs::create_dir_all(&self.artifacts)?;
        Ok(())
    }
}

/// Limits applied to batch execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLimits {
    /// Wall-clock budget for a single generation job.
    pub generation_timeout_secs: u64,
    /// Maximum number of provider calls in flight at once.
    pub max_concurrent_jobs: usize,
    /// Batch cap for free-tier owners.
    pub free_project_limit: i64,
}

impl JobLimits {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

impl Default for JobLimits {
    fn default() -> Self {
        Self {
            generation_timeout_secs: DEFAULT_GENERATION_TIMEOUT_SECS,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            free_project_limit: DEFAULT_FREE_PROJECT_LIMIT,
        }
    }
}

/// Top-level Tastebuds configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TastebudsConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    pub limits: JobLimits,
    /// Comparison sessions untouched for this long are dropped.
    pub session_idle_secs: u64,
}

impl TastebudsConfig {
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let port = env_parse("PORT").unwrap_or(DEFAULT_PORT);

        let limits = JobLimits {
            generation_timeout_secs: env_parse("TASTEBUDS_GENERATION_TIMEOUT_SECS")
                .unwrap_or(DEFAULT_GENERATION_TIMEOUT_SECS),
            max_concurrent_jobs: env_parse::<usize>("TASTEBUDS_MAX_CONCURRENT_JOBS")
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_CONCURRENT_JOBS),
            free_project_limit: env_parse("TASTEBUDS_FREE_PROJECT_LIMIT")
                .unwrap_or(DEFAULT_FREE_PROJECT_LIMIT),
        };

        let session_idle_secs = env_parse::<u64>("TASTEBUDS_SESSION_IDLE_SECS")
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_SESSION_IDLE_SECS);

        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self {
            port,
            data_paths,
            limits,
            session_idle_secs,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
