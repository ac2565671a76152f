//! Hotswap Core Library
//!
//! Replace-and-recover engine for self-updating desktop applications:
//! - Waiting for the running application to exit
//! - Extracting the update archive into a unique staging directory
//! - Moving the current executable aside and restoring it on failure
//! - Placing the new files and relaunching the application
//!
//! The binary entry point is in `main.rs`.

pub mod archive;
pub mod error;
pub mod exit_codes;
pub mod install;
pub mod launch;
pub mod logging;
pub mod orchestrator;
pub mod process;
pub mod request;

pub use archive::{ArchiveExtractor, ZipExtractor};
pub use error::{FsOp, Result, UpdateError, ValidationError};
pub use exit_codes::ExitCode;
pub use install::{
    BackupManager, BackupRecord, BackupStore, DirectoryPlacer, FilePlacer, RestoreOutcome,
    UpdateLock,
};
pub use launch::{DetachedLauncher, Launcher};
pub use orchestrator::{rollback_origin, UpdateOrchestrator, UpdateOutcome, UpdateSettings, UpdateState};
pub use process::{ProcessWaiter, SystemProcessWaiter, WaitSummary};
pub use request::{ExtensionRules, UpdateRequest};
