//! Moving the origin executable aside and putting it back.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{file_digest, DEFAULT_BACKUP_SUFFIX};
use crate::error::{FsOp, Result, UpdateError};

/// What was moved aside. Lives for one run; the file on disk is the
/// durable signal that an update was in flight.
#[derive(Debug, Clone, Serialize)]
pub struct BackupRecord {
    pub origin_path: PathBuf,
    pub backup_path: PathBuf,
    /// SHA256 checksum of the backed-up binary
    pub checksum: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Result of a restore attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Backup moved back to origin.
    Restored,
    /// Preconditions not met; nothing was touched.
    Skipped {
        origin_present: bool,
        backup_present: bool,
    },
}

/// Backup and restore of a single executable.
pub trait BackupStore {
    /// Where the backup of `origin` lives.
    fn backup_path(&self, origin: &Path) -> PathBuf;

    /// Move `origin` to its backup path, replacing any stale backup.
    fn backup(&self, origin: &Path) -> Result<BackupRecord>;

    /// Move `backup` to `origin`, only if origin is absent and backup present.
    fn restore(&self, origin: &Path, backup: &Path) -> Result<RestoreOutcome>;
}

/// Rename-based backup in the origin's own directory.
#[derive(Debug, Clone)]
pub struct BackupManager {
    suffix: String,
}

impl Default for BackupManager {
    fn default() -> Self {
        Self::new(DEFAULT_BACKUP_SUFFIX)
    }
}

impl BackupManager {
    pub fn new(suffix: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Replace `origin` with its backup even if origin exists.
    ///
    /// Used by the manual `rollback --force` path.
    pub fn force_restore(&self, origin: &Path) -> Result<()> {
        let backup = self.backup_path(origin);
        if !backup.exists() {
            return Err(UpdateError::fs(
                FsOp::Restore,
                &backup,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no backup present"),
            ));
        }
        warn!(
            target: "update.rollback",
            origin = %origin.display(),
            backup = %backup.display(),
            "Forcing restore over existing origin"
        );
        fs::rename(&backup, origin).map_err(|e| UpdateError::fs(FsOp::Restore, &backup, e))
    }
}

impl BackupStore for BackupManager {
    fn backup_path(&self, origin: &Path) -> PathBuf {
        let mut name = origin.file_name().unwrap_or_default().to_os_string();
        name.push(&self.suffix);
        origin.with_file_name(name)
    }

    fn backup(&self, origin: &Path) -> Result<BackupRecord> {
        let backup_path = self.backup_path(origin);

        let (checksum, size_bytes) =
            file_digest(origin).map_err(|e| UpdateError::fs(FsOp::Backup, origin, e))?;

        if backup_path.exists() {
            debug!(
                target: "update.backup",
                backup = %backup_path.display(),
                "Replacing stale backup"
            );
        }

        fs::rename(origin, &backup_path).map_err(|e| UpdateError::fs(FsOp::Backup, origin, e))?;

        info!(
            target: "update.backup",
            origin = %origin.display(),
            backup = %backup_path.display(),
            size_bytes,
            "Backup created"
        );

        Ok(BackupRecord {
            origin_path: origin.to_path_buf(),
            backup_path,
            checksum,
            size_bytes,
            created_at: Utc::now(),
        })
    }

    fn restore(&self, origin: &Path, backup: &Path) -> Result<RestoreOutcome> {
        let origin_present = origin.exists();
        let backup_present = backup.exists();
        if origin_present || !backup_present {
            return Ok(RestoreOutcome::Skipped {
                origin_present,
                backup_present,
            });
        }

        fs::rename(backup, origin).map_err(|e| UpdateError::fs(FsOp::Restore, backup, e))?;

        info!(
            target: "update.rollback",
            origin = %origin.display(),
            "Backup restored"
        );
        Ok(RestoreOutcome::Restored)
    }
}
