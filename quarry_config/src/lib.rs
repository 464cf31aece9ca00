//! # Quarry Config
//!
//! Configuration system for the Quarry connector service.
//!
//! Provides TOML-based configuration parsing and validation for the
//! indexing pipeline settings and logging.
//!
//! # Configuration Schema
//!
//! The configuration file (`quarry.toml`) supports the following sections:
//! - `[indexing]` — batch sizing, request timeouts, checkpoint storage
//! - `[log]` — log level and format
//!
//! # Environment Variable Overrides
//!
//! Every config field can be overridden via environment variables using the
//! `QUARRY_` prefix and `_` as section separator:
//! - `QUARRY_INDEXING_BATCH_SIZE` → `indexing.batch_size`
//! - `QUARRY_INDEXING_REQUEST_TIMEOUT_SECS` → `indexing.request_timeout_secs`
//! - `QUARRY_INDEXING_CHECKPOINT_DIR` → `indexing.checkpoint_dir`
//! - `QUARRY_LOG_LEVEL` → `log.level`
//! - `QUARRY_LOG_FORMAT` → `log.format`

use serde::{Deserialize, Serialize};

/// Top-level Quarry configuration.
///
/// Parsed from `quarry.toml` or constructed programmatically.
/// Environment variables with the `QUARRY_` prefix override TOML values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuarryConfig {
    /// Indexing pipeline settings.
    #[serde(default)]
    pub indexing: IndexingConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// Indexing pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Maximum documents per batch handed to the indexing pipeline (default: 16).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Per-request timeout for upstream API calls in seconds (default: 30).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Directory for persisted sync checkpoints (default: "data/checkpoints").
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            request_timeout_secs: default_request_timeout(),
            checkpoint_dir: default_checkpoint_dir(),
        }
    }
}

fn default_batch_size() -> usize {
    16
}
fn default_request_timeout() -> u64 {
    30
}
fn default_checkpoint_dir() -> String {
    "data/checkpoints".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (default: "info").
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format: "text" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl QuarryConfig {
    /// Load configuration from a TOML file, then apply environment variable overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        Self::parse_toml(&contents)
    }

    /// Parse configuration from a TOML string, apply env overrides, then validate.
    pub fn parse_toml(toml_str: &str) -> anyhow::Result<Self> {
        let mut config: QuarryConfig = toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Variables use the `QUARRY_` prefix with `_` as section separator.
    /// Values that fail to parse for numeric fields are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("QUARRY_INDEXING_BATCH_SIZE") {
            if let Ok(size) = v.parse::<usize>() {
                self.indexing.batch_size = size;
            }
        }
        if let Ok(v) = std::env::var("QUARRY_INDEXING_REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                self.indexing.request_timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("QUARRY_INDEXING_CHECKPOINT_DIR") {
            self.indexing.checkpoint_dir = v;
        }
        if let Ok(v) = std::env::var("QUARRY_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Ok(v) = std::env::var("QUARRY_LOG_FORMAT") {
            self.log.format = v;
        }
    }

    /// Validates the configuration, returning a descriptive error for the
    /// first problem found.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.indexing.batch_size == 0 {
            anyhow::bail!("indexing.batch_size must be at least 1");
        }
        if self.indexing.request_timeout_secs == 0 {
            anyhow::bail!("indexing.request_timeout_secs must be at least 1");
        }
        if self.indexing.checkpoint_dir.is_empty() {
            anyhow::bail!("indexing.checkpoint_dir must not be empty");
        }
        match self.log.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!(
                "Invalid log.level '{}': expected trace, debug, info, warn, or error",
                other
            ),
        }
        match self.log.format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("Invalid log.format '{}': expected text or json", other),
        }
        Ok(())
    }
}
