//! Updater configuration types.
//!
//! Every field has a default so a partial `config.json` is valid; the
//! builtin defaults reproduce the classic behaviour (wait 5 s per instance,
//! `<exe>.bak` backup, `.zip` archives, `.exe` origins).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::resolve::resolve_config_path;
use crate::validate::validate_config;
use crate::{ConfigError, LoadedConfig, CONFIG_SCHEMA_VERSION};

/// What to do with running instances of the target process before waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationPolicy {
    /// Wait for the process to exit on its own.
    #[default]
    Graceful,
    /// Kill each instance first, then wait to confirm the exit.
    Forced,
}

impl std::str::FromStr for TerminationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "graceful" | "wait" => Ok(TerminationPolicy::Graceful),
            "forced" | "force" | "kill" => Ok(TerminationPolicy::Forced),
            _ => Err(format!("unknown termination policy: {}", s)),
        }
    }
}

impl std::fmt::Display for TerminationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationPolicy::Graceful => write!(f, "graceful"),
            TerminationPolicy::Forced => write!(f, "forced"),
        }
    }
}

/// Exclusive run lock settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    pub enabled: bool,
    /// Directory holding lock files (None = user cache dir).
    pub dir: Option<PathBuf>,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

/// Relaunch of the updated executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaunchSettings {
    pub enabled: bool,
    /// Arguments passed to the relaunched executable.
    pub args: Vec<String>,
}

impl Default for RelaunchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            args: Vec::new(),
        }
    }
}

/// File log sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Directory for rolling log files (None = stderr only).
    pub dir: Option<PathBuf>,
    pub file_prefix: String,
    /// Number of daily files to keep.
    pub retention_days: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: None,
            file_prefix: "hotswap".to_string(),
            retention_days: 7,
        }
    }
}

/// Complete updater configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    pub schema_version: String,

    /// Logical process name to wait for (None = origin file stem).
    pub process_name: Option<String>,

    pub termination: TerminationPolicy,

    /// Per-instance exit timeout.
    pub wait_timeout_ms: u64,

    pub poll_interval_ms: u64,

    /// Pause before looking for the parent process.
    pub startup_delay_ms: u64,

    /// Appended to the origin file name to form the backup path.
    pub backup_suffix: String,

    /// Accepted origin extensions, without the leading dot.
    pub origin_extensions: Vec<String>,

    /// Accepted archive extensions, without the leading dot.
    pub archive_extensions: Vec<String>,

    /// Check size and checksum of every placed file.
    pub verify_placement: bool,

    pub lock: LockSettings,

    pub relaunch: RelaunchSettings,

    pub logging: LoggingSettings,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            process_name: None,
            termination: TerminationPolicy::Graceful,
            wait_timeout_ms: 5_000,
            poll_interval_ms: 100,
            startup_delay_ms: 0,
            backup_suffix: ".bak".to_string(),
            origin_extensions: vec!["exe".to_string()],
            archive_extensions: vec!["zip".to_string()],
            verify_placement: true,
            lock: LockSettings::default(),
            relaunch: RelaunchSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl UpdaterConfig {
    /// Parse a config file without validating it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::IoError {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve, parse and validate the configuration.
    ///
    /// An explicit CLI path that does not exist is an error; every other
    /// miss falls through to the builtin defaults.
    pub fn load(cli_path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
        if let Some(path) = cli_path {
            if !path.exists() {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                });
            }
        }

        let (path, source) = resolve_config_path(cli_path);
        let config = match &path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };

        validate_config(&config)?;

        Ok(LoadedConfig {
            config,
            path,
            source,
        })
    }

    /// Extension lists normalized to lowercase without a leading dot.
    pub fn normalized_origin_extensions(&self) -> Vec<String> {
        normalize_extensions(&self.origin_extensions)
    }

    pub fn normalized_archive_extensions(&self) -> Vec<String> {
        normalize_extensions(&self.archive_extensions)
    }
}

fn normalize_extensions(exts: &[String]) -> Vec<String> {
    exts.iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
