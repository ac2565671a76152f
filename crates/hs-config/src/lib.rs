//! Hotswap configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for the updater's `config.json`
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation of timeouts, suffixes and extension lists

pub mod resolve;
pub mod updater;
pub mod validate;

pub use resolve::{resolve_config_path, ConfigSource};
pub use updater::{
    LockSettings, LoggingSettings, RelaunchSettings, TerminationPolicy, UpdaterConfig,
};
pub use validate::{validate_config, ValidationError, ValidationResult};

use std::path::PathBuf;
use thiserror::Error;

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid JSON in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Semantic validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

/// A loaded configuration together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: UpdaterConfig,
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}
