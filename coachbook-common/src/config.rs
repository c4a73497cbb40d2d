//! Configuration loading for the sync engine
//!
//! Resolution priority order:
//! 1. Explicit path argument (highest priority)
//! 2. `COACHBOOK_CONFIG` environment variable
//! 3. Platform config dir (`<config>/coachbook/config.toml`)
//! 4. Compiled defaults (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "COACHBOOK_CONFIG";

/// Tunables for the sync engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period before a pending commit is flushed, milliseconds
    pub debounce_ms: u64,

    /// Minimum trimmed answer length for a field to count as answered
    pub min_answer_len: usize,

    /// Pause between bulk transfer items, milliseconds
    pub transfer_pacing_ms: u64,

    /// Deadline for AI-assist calls before the deterministic fallback is used
    pub assist_timeout_secs: u64,

    /// Event bus channel capacity
    pub event_capacity: usize,

    /// Base URL of the remote record store API
    pub store_base_url: String,

    /// Path of the durable local cache database; `None` uses the platform
    /// data dir
    pub cache_db_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            min_answer_len: 25,
            transfer_pacing_ms: 150,
            assist_timeout_secs: 30,
            event_capacity: 256,
            store_base_url: "http://127.0.0.1:8080/api".to_string(),
            cache_db_path: None,
        }
    }
}

impl SyncConfig {
    /// Debounce quiet period as a [`Duration`]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Transfer pacing delay as a [`Duration`]
    pub fn transfer_pacing(&self) -> Duration {
        Duration::from_millis(self.transfer_pacing_ms)
    }

    /// AI-assist deadline as a [`Duration`]
    pub fn assist_timeout(&self) -> Duration {
        Duration::from_secs(self.assist_timeout_secs)
    }

    /// Load configuration following the documented priority order
    pub fn load(explicit_path: Option<&str>) -> Result<Self> {
        // Priority 1: explicit path argument
        if let Some(path) = explicit_path {
            return Self::from_file(PathBuf::from(path));
        }

        // Priority 2: environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(PathBuf::from(path));
        }

        // Priority 3: platform config dir
        if let Some(path) = default_config_path() {
            if path.exists() {
                return Self::from_file(path);
            }
        }

        // Priority 4: compiled defaults
        Ok(Self::default())
    }

    /// Parse configuration from a TOML file
    pub fn from_file(path: PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("cannot read {:?}: {}", path, e)))?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("cannot parse {:?}: {}", path, e)))
    }

    /// Resolved local cache database path
    pub fn cache_db(&self) -> PathBuf {
        if let Some(path) = &self.cache_db_path {
            return path.clone();
        }
        dirs::data_local_dir()
            .map(|d| d.join("coachbook").join("cache.db"))
            .unwrap_or_else(|| PathBuf::from("coachbook-cache.db"))
    }
}

/// Default configuration file path for the platform
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("coachbook").join("config.toml"))
}
