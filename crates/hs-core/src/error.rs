//! Error types for update runs.
//!
//! Every error raised between input validation and relaunch is an
//! [`UpdateError`]; the orchestrator decides from the variant and the
//! filesystem state whether a rollback is attempted.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::exit_codes::ExitCode;

/// Result type alias for update operations.
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Input validation failures. Raised before any side effect.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("origin file not found: {0}")]
    OriginNotFound(PathBuf),

    #[error("origin is not a regular file: {0}")]
    OriginNotAFile(PathBuf),

    #[error("invalid origin path {path}: must be an executable ({expected})")]
    OriginExtension { path: PathBuf, expected: String },

    #[error("update file not found: {0}")]
    UpdateNotFound(PathBuf),

    #[error("update is not a regular file: {0}")]
    UpdateNotAFile(PathBuf),

    #[error("invalid update path {path}: must be an archive ({expected})")]
    UpdateExtension { path: PathBuf, expected: String },

    #[error("path has no parent directory: {0}")]
    NoParentDirectory(PathBuf),
}

/// The filesystem step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    Backup,
    Restore,
    Place,
    DeleteArchive,
    CreateStaging,
    RemoveStaging,
    Lock,
}

impl std::fmt::Display for FsOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FsOp::Backup => "backup",
            FsOp::Restore => "restore",
            FsOp::Place => "place",
            FsOp::DeleteArchive => "delete archive",
            FsOp::CreateStaging => "create staging directory",
            FsOp::RemoveStaging => "remove staging directory",
            FsOp::Lock => "lock",
        };
        write!(f, "{}", s)
    }
}

/// Errors raised during an update run.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("process {name} (pid {pid}) did not exit within {timeout:?}")]
    ProcessDidNotExit {
        name: String,
        pid: u32,
        timeout: Duration,
    },

    #[error("cannot query processes named {name:?}: {reason}")]
    ProcessQuery { name: String, reason: String },

    #[error("extraction target missing: {0}")]
    ExtractionTargetMissing(PathBuf),

    #[error("failed to read archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive {archive} does not contain {name}")]
    MissingExecutable { archive: PathBuf, name: String },

    #[error("{op} failed for {path}: {source}")]
    Filesystem {
        op: FsOp,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("placed file {path} does not match its source: expected {expected}, got {actual}")]
    PlacementMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("another update holds the lock {0}")]
    LockUnavailable(PathBuf),

    #[error("failed to launch {path}: {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rollback failed after `{cause}`: {restore}")]
    RollbackFailed {
        cause: Box<UpdateError>,
        restore: Box<UpdateError>,
    },
}

impl UpdateError {
    /// Shorthand for a filesystem failure.
    pub fn fs(op: FsOp, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UpdateError::Filesystem {
            op,
            path: path.into(),
            source,
        }
    }

    /// Map to the CLI exit code.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            UpdateError::Validation(_) => ExitCode::ArgsError,
            UpdateError::ProcessDidNotExit { .. } => ExitCode::TimeoutError,
            UpdateError::ProcessQuery { .. } => ExitCode::InternalError,
            UpdateError::ExtractionTargetMissing(_)
            | UpdateError::Archive { .. }
            | UpdateError::MissingExecutable { .. } => ExitCode::ArchiveError,
            UpdateError::Filesystem { source, .. } => {
                if source.kind() == std::io::ErrorKind::PermissionDenied {
                    ExitCode::PermissionError
                } else {
                    ExitCode::IoError
                }
            }
            UpdateError::PlacementMismatch { .. } => ExitCode::IoError,
            UpdateError::LockUnavailable(_) => ExitCode::LockError,
            UpdateError::Launch { .. } => ExitCode::LaunchError,
            UpdateError::RollbackFailed { .. } => ExitCode::RollbackError,
        }
    }
}
