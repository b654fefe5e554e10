//! Configuration types for davtree.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::mount::MountOptions;
use super::path::TreePath;

/// Log level for davtree tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only log errors
    Error,
    /// Log errors and warnings
    Warn,
    /// Log errors, warnings, and informational messages
    Info,
    /// Log errors, warnings, info, and debug messages
    Debug,
    /// Log everything including trace-level details
    Trace,
}

impl LogLevel {
    /// Returns the string representation of the log level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// Default extension marking an upload part still in transfer.
pub const DEFAULT_PART_EXTENSION: &str = "part";

/// Default upper bound for a single path component, in bytes.
pub const DEFAULT_MAX_NAME_LENGTH: usize = 255;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Configuration for a davtree deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Logging level
    pub log_level: LogLevel,

    /// Absolute path the user's view is rooted at
    pub view_root: TreePath,

    /// Extension of in-flight upload parts
    pub part_extension: String,

    /// Maximum length of a single name, in bytes
    pub max_name_length: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            view_root: TreePath::root(),
            part_extension: DEFAULT_PART_EXTENSION.to_string(),
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
        }
    }
}

impl TreeConfig {
    /// Creates a new TreeConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads a JSON config file and validates it.
    pub fn load_validated(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.part_extension.is_empty() {
            errors.push("part_extension must not be empty".to_string());
        }
        if self.part_extension.contains('.') || self.part_extension.contains('/') {
            errors.push(format!(
                "part_extension must be a bare extension, got {:?}",
                self.part_extension
            ));
        }
        if self.max_name_length == 0 {
            errors.push("max_name_length must be greater than zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// A persisted description of one mount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountRecord {
    /// Unique identifier for this mount
    pub id: Uuid,

    /// Absolute mount point
    pub mount_point: TreePath,

    /// Identifier of the storage attached at the mount point
    pub storage_id: String,

    /// Mount options used
    #[serde(default)]
    pub options: MountOptions,
}

impl MountRecord {
    /// Creates a new mount record.
    pub fn new(mount_point: impl Into<TreePath>, storage_id: impl Into<String>, options: MountOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            mount_point: mount_point.into(),
            storage_id: storage_id.into(),
            options,
        }
    }
}
