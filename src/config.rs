//! Configuration management for watchlog
//!
//! This module provides configuration structures and defaults for the
//! store, the watcher and output, with environment and TOML file overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use crate::filter::ExtensionFilter;

/// Global configuration for watchlog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchLogConfig {
    /// Database configuration
    pub store: StoreConfig,
    /// File watcher configuration
    pub watcher: WatcherConfig,
    /// Output configuration
    pub output: OutputConfig,
}

/// Configuration for the SQLite store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; its journals are named after it
    pub db_path: PathBuf,
}

/// Configuration for file watching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// How long the consumer waits for new entries per poll, in milliseconds
    pub dispatch_interval_ms: u64,
    /// Extension filter used when none is given on the command line
    pub default_extension: ExtensionFilter,
}

/// How entries are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// JSON output for scripting
    Json,
    /// Compact single-line format
    Compact,
}

/// Configuration for output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub no_color: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("log.db"),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: 100,
            default_extension: ExtensionFilter::All,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            no_color: false,
        }
    }
}

impl WatcherConfig {
    /// Get dispatch interval duration
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }
}

impl WatchLogConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load the file if it exists, then apply environment overrides
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.as_ref().exists() => Self::load(path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Defaults with environment variable overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("WATCHLOG_DB_PATH") {
            if !val.is_empty() {
                self.store.db_path = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var("WATCHLOG_DISPATCH_INTERVAL_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.watcher.dispatch_interval_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("WATCHLOG_EXTENSION") {
            match val.parse::<ExtensionFilter>() {
                Ok(ext) => self.watcher.default_extension = ext,
                Err(err) => tracing::warn!("Ignoring WATCHLOG_EXTENSION: {}", err),
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.store.db_path.as_os_str().is_empty() {
            return Err("db_path must not be empty".to_string());
        }

        if self.store.db_path.file_name().is_none() {
            return Err(format!("db_path must name a file: {}", self.store.db_path.display()));
        }

        if self.watcher.dispatch_interval_ms == 0 {
            return Err("dispatch_interval_ms must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = WatchLogConfig::default();

        assert_eq!(config.store.db_path, PathBuf::from("log.db"));
        assert_eq!(config.watcher.dispatch_interval_ms, 100);
        assert_eq!(config.watcher.default_extension, ExtensionFilter::All);
        assert_eq!(config.output.format, OutputFormat::Text);
    }

    #[test]
    fn test_config_validation() {
        let mut config = WatchLogConfig::default();
        assert!(config.validate().is_ok());

        config.watcher.dispatch_interval_ms = 0;
        assert!(config.validate().is_err());

        config.watcher.dispatch_interval_ms = 50;
        config.store.db_path = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_conversions() {
        let config = WatcherConfig::default();
        assert_eq!(config.dispatch_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_load_partial_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("watchlog.toml");
        std::fs::write(
            &path,
            "[store]\ndb_path = \"activity.db\"\n\n[watcher]\ndefault_extension = \".txt\"\n\n[output]\nformat = \"json\"\n",
        )
        .unwrap();

        let config = WatchLogConfig::load(&path).unwrap();
        assert_eq!(config.store.db_path, PathBuf::from("activity.db"));
        assert_eq!(config.watcher.default_extension, ExtensionFilter::Only(".txt".to_string()));
        assert_eq!(config.watcher.dispatch_interval_ms, 100);
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_load_rejects_bad_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("watchlog.toml");
        std::fs::write(&path, "[watcher]\ndefault_extension = \"txt\"\n").unwrap();

        assert!(WatchLogConfig::load(&path).is_err());
    }

    #[test]
    fn test_env_config_loading() {
        std::env::set_var("WATCHLOG_DB_PATH", "/tmp/elsewhere.db");
        std::env::set_var("WATCHLOG_DISPATCH_INTERVAL_MS", "250");
        std::env::set_var("WATCHLOG_EXTENSION", ".csv");

        let config = WatchLogConfig::from_env();

        assert_eq!(config.store.db_path, PathBuf::from("/tmp/elsewhere.db"));
        assert_eq!(config.watcher.dispatch_interval_ms, 250);
        assert_eq!(config.watcher.default_extension, ExtensionFilter::Only(".csv".to_string()));

        // Cleanup
        std::env::remove_var("WATCHLOG_DB_PATH");
        std::env::remove_var("WATCHLOG_DISPATCH_INTERVAL_MS");
        std::env::remove_var("WATCHLOG_EXTENSION");
    }
}
