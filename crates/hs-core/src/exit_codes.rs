//! Exit codes for the hotswap CLI.
//!
//! The parent application (or whoever inspects the updater's status) reads
//! the outcome from the code alone; log output is for humans.
//!
//! Exit code ranges:
//! - 0: Update applied (or check/rollback succeeded)
//! - 10-19: User/environment errors (bad inputs, locks, permissions)
//! - 20-29: Internal/runtime errors (I/O, timeouts, failed rollback)

/// Exit codes for hotswap operations.
///
/// These codes are a stable contract for automation. Changes require
/// a major version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Clean = 0,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments or input paths
    ArgsError = 10,

    /// Update archive unreadable or incomplete
    ArchiveError = 11,

    /// Permission denied
    PermissionError = 12,

    /// Configuration file missing or invalid
    ConfigError = 13,

    /// Lock contention (another hotswap run targets the same executable)
    LockError = 14,

    /// Updated executable could not be started
    LaunchError = 15,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,

    /// Target process did not exit in time
    TimeoutError = 22,

    /// Rollback failed; manual recovery required
    RollbackError = 23,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ArchiveError => "ERR_ARCHIVE",
            ExitCode::PermissionError => "ERR_PERMISSION",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::LockError => "ERR_LOCK",
            ExitCode::LaunchError => "ERR_LAUNCH",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::TimeoutError => "ERR_TIMEOUT",
            ExitCode::RollbackError => "ERR_ROLLBACK",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
