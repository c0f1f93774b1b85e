//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (GRAPHFOLD_*)
//! 2. TOML config file (if GRAPHFOLD_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (GRAPHFOLD_*)
/// 2. TOML config file (if GRAPHFOLD_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the shared SQLite backing store.
    ///
    /// Set via GRAPHFOLD_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Development mode: use an in-process, in-memory backing store
    /// instead of the shared file-backed one.
    ///
    /// Set via GRAPHFOLD_DEBUG environment variable.
    #[serde(default)]
    pub debug: bool,

    /// Namespace prefixed to every ephemeral cache key.
    ///
    /// Set via GRAPHFOLD_NAMESPACE environment variable.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Storage root for the external-store aggregation strategy.
    ///
    /// Set via GRAPHFOLD_DATA_ROOT environment variable.
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    /// Batch size controlling progress-log cadence and flush batches.
    ///
    /// Set via GRAPHFOLD_CHUNK_SIZE environment variable.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via GRAPHFOLD_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via GRAPHFOLD_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Response size above which a source should be streamed rather than
    /// buffered.
    ///
    /// Set via GRAPHFOLD_STREAM_THRESHOLD_BYTES environment variable.
    #[serde(default = "default_stream_threshold")]
    pub stream_threshold_bytes: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./graphfold-cache.sqlite")
}

fn default_namespace() -> String {
    "graphfold".into()
}

fn default_data_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_chunk_size() -> usize {
    1000
}

fn default_user_agent() -> String {
    "graphfold/0.1".into()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_stream_threshold() -> u64 {
    5 * 1024 * 1024 // 5MB
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            debug: false,
            namespace: default_namespace(),
            data_root: default_data_root(),
            chunk_size: default_chunk_size(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            stream_threshold_bytes: default_stream_threshold(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `GRAPHFOLD_`
    /// 2. TOML file from `GRAPHFOLD_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("GRAPHFOLD_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("GRAPHFOLD_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
