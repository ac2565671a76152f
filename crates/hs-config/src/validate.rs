//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::updater::UpdaterConfig;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validate an updater configuration semantically.
pub fn validate_config(config: &UpdaterConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    if config.wait_timeout_ms == 0 {
        return Err(ValidationError::invalid("wait_timeout_ms", "must be > 0"));
    }
    if config.poll_interval_ms == 0 {
        return Err(ValidationError::invalid("poll_interval_ms", "must be > 0"));
    }
    if config.poll_interval_ms > config.wait_timeout_ms {
        return Err(ValidationError::invalid(
            "poll_interval_ms",
            format!(
                "must not exceed wait_timeout_ms ({} > {})",
                config.poll_interval_ms, config.wait_timeout_ms
            ),
        ));
    }

    let suffix = config.backup_suffix.trim();
    if suffix.is_empty() {
        return Err(ValidationError::invalid("backup_suffix", "must not be empty"));
    }
    if suffix.contains('/') || suffix.contains('\\') {
        return Err(ValidationError::invalid(
            "backup_suffix",
            "must not contain path separators",
        ));
    }

    if config.normalized_origin_extensions().is_empty() {
        return Err(ValidationError::invalid(
            "origin_extensions",
            "at least one extension is required",
        ));
    }
    if config.normalized_archive_extensions().is_empty() {
        return Err(ValidationError::invalid(
            "archive_extensions",
            "at least one extension is required",
        ));
    }

    if let Some(name) = &config.process_name {
        if name.trim().is_empty() {
            return Err(ValidationError::invalid("process_name", "must not be blank"));
        }
    }

    if config.logging.retention_days == 0 {
        return Err(ValidationError::invalid("logging.retention_days", "must be >= 1"));
    }
    if config.logging.file_prefix.trim().is_empty() {
        return Err(ValidationError::invalid("logging.file_prefix", "must not be empty"));
    }

    Ok(())
}
