//! Configuration management for crashlog

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::logging::{Severity, DEFAULT_HISTORY_CAPACITY};

/// Size after which a text log file is rotated (1 MiB)
pub const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Log files (and crash files) kept per prefix
pub const DEFAULT_MAX_FILES: usize = 5;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory log and crash files are written to
    #[serde(default = "logs_dir")]
    pub log_dir: PathBuf,

    /// Number of recent entries kept for crash dumps (default: 60)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Record entries for crash dumps (default: true)
    #[serde(default = "default_true")]
    pub crash_dump_enabled: bool,

    /// Threshold sinks start with: "silent", "error", "warning", "info" or "debug"
    #[serde(default)]
    pub default_threshold: Severity,

    /// Duplicate file sink output to stdout
    #[serde(default)]
    pub mirror_to_console: bool,

    /// Rotate the text log once it grows past this many bytes
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Number of log files and crash files kept per prefix
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Write plain text logs
    #[serde(default = "default_true")]
    pub text_sink: bool,

    /// Write HTML logs
    #[serde(default)]
    pub html_sink: bool,
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_true() -> bool {
    true
}

fn default_max_file_bytes() -> u64 {
    DEFAULT_MAX_FILE_BYTES
}

fn default_max_files() -> usize {
    DEFAULT_MAX_FILES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: logs_dir(),
            history_capacity: default_history_capacity(),
            crash_dump_enabled: true,
            default_threshold: Severity::default(),
            mirror_to_console: false,
            max_file_bytes: default_max_file_bytes(),
            max_files: default_max_files(),
            text_sink: true,
            html_sink: false,
        }
    }
}

impl Config {
    /// Load configuration from the default file, or return default if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from `path`, or return default if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Ensure the log directory exists
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.log_dir).context("Failed to create logs directory")?;
        Ok(())
    }
}

/// Get the base configuration directory (~/.crashlog)
/// Falls back to ./.crashlog if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    try_config_dir().unwrap_or_else(|| {
        tracing::warn!("Could not determine home directory, using current directory for config");
        PathBuf::from(".crashlog")
    })
}

/// Try to get the base configuration directory, returning None if home dir is unavailable
pub fn try_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".crashlog"))
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the path to the logs directory
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}
