/*!
 * Configuration types for Ferry
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, TransferError};
use crate::protocol::s3::S3Config;
use crate::transfer::{DEFAULT_MULTIPART_THRESHOLD, DEFAULT_THREAD_COUNT, MIN_CHUNK_SIZE};

/// Main configuration for transfers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Download mode (auto, single_request, get_range)
    #[serde(default)]
    pub mode: DownloadMode,

    /// Concurrent requests per batch
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,

    /// Fixed download chunk size in bytes (planned automatically when unset)
    #[serde(default)]
    pub chunk_size: Option<u64>,

    /// Uploads at or above this many bytes go multipart
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,

    /// Fixed multipart part size in bytes (planned automatically when unset)
    #[serde(default)]
    pub multipart_part_size: Option<u64>,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,

    /// S3 client settings
    #[serde(default)]
    pub s3: S3Config,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            mode: DownloadMode::Auto,
            thread_count: default_thread_count(),
            chunk_size: None,
            multipart_threshold: default_multipart_threshold(),
            multipart_part_size: None,
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
            s3: S3Config::default(),
        }
    }
}

impl TransferConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| {
            TransferError::InvalidConfiguration(format!("{}: {}", path.display(), e))
        })
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| TransferError::InvalidConfiguration(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject settings no transfer could run with
    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(TransferError::InvalidConfiguration(
                "thread_count must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == Some(0) {
            return Err(TransferError::InvalidConfiguration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.mode == DownloadMode::GetRange && self.chunk_size.is_none() {
            return Err(TransferError::InvalidConfiguration(
                "get_range mode requires chunk_size".to_string(),
            ));
        }
        if self.multipart_threshold == 0 {
            return Err(TransferError::InvalidConfiguration(
                "multipart_threshold must be greater than zero".to_string(),
            ));
        }
        if let Some(part_size) = self.multipart_part_size {
            if part_size < MIN_CHUNK_SIZE {
                return Err(TransferError::InvalidConfiguration(format!(
                    "multipart_part_size {} is below the minimum {}",
                    part_size, MIN_CHUNK_SIZE
                )));
            }
        }
        self.s3
            .validate()
            .map_err(|e| TransferError::InvalidConfiguration(e.to_string()))
    }

    /// Level after applying the `verbose` shorthand
    pub fn effective_log_level(&self) -> LogLevel {
        if self.verbose && self.log_level < LogLevel::Debug {
            LogLevel::Debug
        } else {
            self.log_level
        }
    }
}

/// How a download picks its request shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    /// Probe the object and choose
    #[default]
    Auto,

    /// One whole-object request, no probing
    SingleRequest,

    /// Byte-range fan-out with a fixed chunk size
    GetRange,
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadMode::Auto => write!(f, "auto"),
            DownloadMode::SingleRequest => write!(f, "single_request"),
            DownloadMode::GetRange => write!(f, "get_range"),
        }
    }
}

impl FromStr for DownloadMode {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DownloadMode::Auto),
            "single_request" | "single" => Ok(DownloadMode::SingleRequest),
            "get_range" | "range" => Ok(DownloadMode::GetRange),
            other => Err(TransferError::InvalidConfiguration(format!(
                "Unsupported download mode '{}': expected auto, single_request or get_range",
                other
            ))),
        }
    }
}

/// Log level for diagnostic output
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(TransferError::InvalidConfiguration(format!(
                "Unknown log level '{}'",
                other
            ))),
        }
    }
}

// Default value functions for serde
fn default_thread_count() -> usize {
    DEFAULT_THREAD_COUNT
}

fn default_multipart_threshold() -> u64 {
    DEFAULT_MULTIPART_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = TransferConfig::default();
        assert_eq!(config.mode, DownloadMode::Auto);
        assert_eq!(config.thread_count, 10);
        assert_eq!(config.multipart_threshold, 15 * 1024 * 1024);
        assert!(config.chunk_size.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("auto".parse::<DownloadMode>().unwrap(), DownloadMode::Auto);
        assert_eq!(
            "single_request".parse::<DownloadMode>().unwrap(),
            DownloadMode::SingleRequest
        );
        assert_eq!(
            "GET_RANGE".parse::<DownloadMode>().unwrap(),
            DownloadMode::GetRange
        );
        assert!(matches!(
            "multipart".parse::<DownloadMode>(),
            Err(TransferError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_mode_display_round_trips() {
        for mode in [
            DownloadMode::Auto,
            DownloadMode::SingleRequest,
            DownloadMode::GetRange,
        ] {
            assert_eq!(mode.to_string().parse::<DownloadMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_validation_failures() {
        let get_range_without_chunk = TransferConfig {
            mode: DownloadMode::GetRange,
            ..Default::default()
        };
        assert!(get_range_without_chunk.validate().is_err());

        let zero_threads = TransferConfig {
            thread_count: 0,
            ..Default::default()
        };
        assert!(zero_threads.validate().is_err());

        let tiny_parts = TransferConfig {
            multipart_part_size: Some(1024),
            ..Default::default()
        };
        assert!(tiny_parts.validate().is_err());
    }

    #[test]
    fn test_verbose_raises_level() {
        let config = TransferConfig {
            verbose: true,
            ..Default::default()
        };
        assert_eq!(config.effective_log_level(), LogLevel::Debug);

        let trace = TransferConfig {
            verbose: true,
            log_level: LogLevel::Trace,
            ..Default::default()
        };
        assert_eq!(trace.effective_log_level(), LogLevel::Trace);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ferry.toml");
        let config = TransferConfig {
            mode: DownloadMode::GetRange,
            chunk_size: Some(8 * 1024 * 1024),
            thread_count: 4,
            ..Default::default()
        };

        config.to_file(&path).unwrap();
        assert_eq!(TransferConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_toml() {
        let toml_str = r#"
mode = "get_range"
chunk_size = 10485760
log_level = "debug"

[s3]
region = "eu-west-1"
force_path_style = true
"#;
        let config: TransferConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.mode, DownloadMode::GetRange);
        assert_eq!(config.chunk_size, Some(10 * 1024 * 1024));
        assert_eq!(config.thread_count, 10);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.s3.region.as_deref(), Some("eu-west-1"));
        assert!(config.s3.force_path_style);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_mode_in_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "mode = \"sideways\"\n").unwrap();
        assert!(matches!(
            TransferConfig::from_file(&path),
            Err(TransferError::InvalidConfiguration(_))
        ));
    }
}
