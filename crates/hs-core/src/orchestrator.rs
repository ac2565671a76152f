//! Update orchestration: wait, extract, back up, place, clean up, relaunch.
//!
//! The orchestrator owns the rollback policy. Once the origin has been moved
//! aside, any failure up to and including archive deletion triggers a restore
//! attempt, which only proceeds when the origin is missing and the backup is
//! present. The staging directory is removed on every path once created.

use hs_config::{TerminationPolicy, UpdaterConfig};
use serde::Serialize;
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::archive::ArchiveExtractor;
use crate::error::{FsOp, Result, UpdateError};
use crate::install::{
    compute_checksum, default_lock_dir, recovery_note_path, write_recovery_instructions,
    BackupRecord, BackupStore, FilePlacer, RestoreOutcome, UpdateLock,
};
use crate::launch::Launcher;
use crate::log_event;
use crate::logging::{event_names, LogContext};
use crate::process::{ProcessWaiter, WaitSummary};
use crate::request::{ExtensionRules, UpdateRequest};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    Idle,
    WaitingForExit,
    Extracting,
    BackingUp,
    Placing,
    CleaningUp,
    Relaunching,
    Done,
    ErrorRollback,
}

impl std::fmt::Display for UpdateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpdateState::Idle => "idle",
            UpdateState::WaitingForExit => "waiting_for_exit",
            UpdateState::Extracting => "extracting",
            UpdateState::BackingUp => "backing_up",
            UpdateState::Placing => "placing",
            UpdateState::CleaningUp => "cleaning_up",
            UpdateState::Relaunching => "relaunching",
            UpdateState::Done => "done",
            UpdateState::ErrorRollback => "error_rollback",
        };
        write!(f, "{}", s)
    }
}

/// Run-level knobs, usually derived from [`UpdaterConfig`].
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    /// Logical process name; `None` uses the origin file stem.
    pub process_name: Option<String>,
    pub termination: TerminationPolicy,
    pub startup_delay: Duration,
    /// Lock directory; `None` disables the run lock.
    pub lock_dir: Option<PathBuf>,
    pub relaunch: bool,
    pub relaunch_args: Vec<String>,
    pub rules: ExtensionRules,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            process_name: None,
            termination: TerminationPolicy::Graceful,
            startup_delay: Duration::ZERO,
            lock_dir: None,
            relaunch: true,
            relaunch_args: Vec::new(),
            rules: ExtensionRules::default(),
        }
    }
}

impl UpdateSettings {
    pub fn from_config(config: &UpdaterConfig) -> Self {
        let lock_dir = if config.lock.enabled {
            Some(config.lock.dir.clone().unwrap_or_else(default_lock_dir))
        } else {
            None
        };
        Self {
            process_name: config.process_name.clone(),
            termination: config.termination,
            startup_delay: Duration::from_millis(config.startup_delay_ms),
            lock_dir,
            relaunch: config.relaunch.enabled,
            relaunch_args: config.relaunch.args.clone(),
            rules: ExtensionRules::from_config(config),
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub backup: BackupRecord,
    pub placed: Vec<PathBuf>,
    pub relaunched_pid: Option<u32>,
    pub wait: WaitSummary,
    pub duration_ms: u128,
}

/// Sequences the leaf components for one update run.
pub struct UpdateOrchestrator<'a> {
    waiter: &'a dyn ProcessWaiter,
    extractor: &'a dyn ArchiveExtractor,
    backups: &'a dyn BackupStore,
    placer: &'a dyn FilePlacer,
    launcher: &'a dyn Launcher,
    settings: UpdateSettings,
    ctx: LogContext,
    state: Cell<UpdateState>,
}

impl<'a> UpdateOrchestrator<'a> {
    pub fn new(
        waiter: &'a dyn ProcessWaiter,
        extractor: &'a dyn ArchiveExtractor,
        backups: &'a dyn BackupStore,
        placer: &'a dyn FilePlacer,
        launcher: &'a dyn Launcher,
        ctx: LogContext,
    ) -> Self {
        Self {
            waiter,
            extractor,
            backups,
            placer,
            launcher,
            settings: UpdateSettings::default(),
            ctx,
            state: Cell::new(UpdateState::Idle),
        }
    }

    pub fn with_settings(mut self, settings: UpdateSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    pub fn state(&self) -> UpdateState {
        self.state.get()
    }

    fn enter(&self, state: UpdateState) {
        log_event!(
            self.ctx,
            DEBUG,
            "update.state",
            state,
            "State transition",
            from = %self.state.get()
        );
        self.state.set(state);
    }

    /// Validate raw paths, then run. Nothing is touched on invalid input.
    pub fn run_paths(&self, origin: &Path, update: &Path) -> Result<UpdateOutcome> {
        let request = match UpdateRequest::validate(origin, update, &self.settings.rules) {
            Ok(request) => request,
            Err(err) => {
                log_event!(
                    self.ctx,
                    ERROR,
                    event_names::UPDATE_FAILED,
                    self.state(),
                    "Invalid update request",
                    error = %err
                );
                return Err(err.into());
            }
        };
        self.run(&request)
    }

    /// Run the full sequence for a validated request.
    pub fn run(&self, request: &UpdateRequest) -> Result<UpdateOutcome> {
        let started = Instant::now();
        self.state.set(UpdateState::Idle);
        log_event!(
            self.ctx,
            INFO,
            event_names::UPDATE_STARTED,
            self.state(),
            "Starting update",
            origin = %request.origin().display(),
            update = %request.update().display()
        );

        let _lock = match &self.settings.lock_dir {
            Some(dir) => {
                let lock = UpdateLock::acquire(dir, request.origin())
                    .inspect_err(|err| self.report_failure(err))?;
                log_event!(
                    self.ctx,
                    DEBUG,
                    event_names::LOCK_ACQUIRED,
                    self.state(),
                    "Run lock acquired",
                    path = %lock.path().display()
                );
                Some(lock)
            }
            None => None,
        };

        if !self.settings.startup_delay.is_zero() {
            thread::sleep(self.settings.startup_delay);
        }

        let mut staging: Option<PathBuf> = None;
        let result = self.execute(request, &mut staging);

        let cleanup = match staging.as_deref() {
            Some(dir) => self.remove_staging(dir),
            None => Ok(()),
        };

        let outcome = match (result, cleanup) {
            (Ok(mut outcome), Ok(())) => {
                outcome.duration_ms = started.elapsed().as_millis();
                outcome
            }
            (Ok(_), Err(err)) => {
                self.report_failure(&err);
                return Err(err);
            }
            (Err(err), cleanup) => {
                if let Err(cleanup_err) = cleanup {
                    log_event!(
                        self.ctx,
                        WARN,
                        event_names::STAGING_REMOVED,
                        self.state(),
                        "Staging cleanup failed after earlier error",
                        error = %cleanup_err
                    );
                }
                self.report_failure(&err);
                return Err(err);
            }
        };

        self.enter(UpdateState::Done);
        log_event!(
            self.ctx,
            INFO,
            event_names::UPDATE_FINISHED,
            self.state(),
            "Update complete",
            files = outcome.placed.len(),
            duration_ms = outcome.duration_ms as u64
        );
        Ok(outcome)
    }

    fn execute(&self, request: &UpdateRequest, staging: &mut Option<PathBuf>) -> Result<UpdateOutcome> {
        // Waiting
        self.enter(UpdateState::WaitingForExit);
        let name = self
            .settings
            .process_name
            .clone()
            .unwrap_or_else(|| request.default_process_name());
        log_event!(
            self.ctx,
            INFO,
            event_names::WAIT_STARTED,
            self.state(),
            "Waiting for application to exit",
            process = %name,
            policy = %self.settings.termination
        );
        let wait = self.waiter.wait_for_exit(&name, self.settings.termination)?;
        log_event!(
            self.ctx,
            INFO,
            event_names::WAIT_FINISHED,
            self.state(),
            "Application exited",
            instances = wait.matched.len(),
            killed = wait.killed.len()
        );

        // Extracting
        self.enter(UpdateState::Extracting);
        let dir = self
            .extractor
            .extract(request.update(), &mut |created| *staging = Some(created.to_path_buf()))?;
        if staging.is_none() {
            *staging = Some(dir.clone());
        }
        if !dir.is_dir() {
            return Err(UpdateError::ExtractionTargetMissing(dir));
        }
        if !dir.join(request.origin_file_name()).is_file() {
            return Err(UpdateError::MissingExecutable {
                archive: request.update().to_path_buf(),
                name: request.origin_file_name().to_string_lossy().into_owned(),
            });
        }
        log_event!(
            self.ctx,
            INFO,
            event_names::EXTRACT_FINISHED,
            self.state(),
            "Update extracted",
            staging = %dir.display()
        );

        // Backing up
        self.enter(UpdateState::BackingUp);
        let backup = match self.backups.backup(request.origin()) {
            Ok(record) => record,
            Err(err) => {
                let backup_path = self.backups.backup_path(request.origin());
                return Err(self.rollback(request.origin(), &backup_path, None, err));
            }
        };
        log_event!(
            self.ctx,
            INFO,
            event_names::BACKUP_CREATED,
            self.state(),
            "Origin moved aside",
            backup = %backup.backup_path.display(),
            size_bytes = backup.size_bytes
        );

        // Placing and archive cleanup
        let placed = match self.install(request, &dir) {
            Ok(placed) => placed,
            Err(err) => {
                return Err(self.rollback(
                    request.origin(),
                    &backup.backup_path,
                    Some(&backup.checksum),
                    err,
                ))
            }
        };

        // Relaunching
        self.enter(UpdateState::Relaunching);
        let relaunched_pid = if self.settings.relaunch {
            let pid = self
                .launcher
                .launch(request.origin(), &self.settings.relaunch_args)?;
            log_event!(
                self.ctx,
                INFO,
                event_names::RELAUNCHED,
                self.state(),
                "Updated application started",
                pid = pid
            );
            Some(pid)
        } else {
            None
        };

        Ok(UpdateOutcome {
            backup,
            placed,
            relaunched_pid,
            wait,
            duration_ms: 0,
        })
    }

    /// Place staged files, then delete the archive.
    fn install(&self, request: &UpdateRequest, staging: &Path) -> Result<Vec<PathBuf>> {
        self.enter(UpdateState::Placing);
        let placed = self
            .placer
            .place(staging, request.origin_dir(), request.origin_file_name())?;
        log_event!(
            self.ctx,
            INFO,
            event_names::PLACE_FINISHED,
            self.state(),
            "Files placed",
            files = placed.len()
        );

        self.enter(UpdateState::CleaningUp);
        fs::remove_file(request.update())
            .map_err(|e| UpdateError::fs(FsOp::DeleteArchive, request.update(), e))?;
        log_event!(
            self.ctx,
            INFO,
            event_names::ARCHIVE_DELETED,
            self.state(),
            "Update archive deleted",
            path = %request.update().display()
        );
        Ok(placed)
    }

    /// Restore the backup if the origin is gone; returns the error to surface.
    fn rollback(
        &self,
        origin: &Path,
        backup: &Path,
        expected_checksum: Option<&str>,
        cause: UpdateError,
    ) -> UpdateError {
        self.enter(UpdateState::ErrorRollback);
        log_event!(
            self.ctx,
            WARN,
            event_names::ROLLBACK_STARTED,
            self.state(),
            "Update failed after backup; checking rollback",
            error = %cause
        );

        match self.backups.restore(origin, backup) {
            Ok(RestoreOutcome::Restored) => {
                if let Some(expected) = expected_checksum {
                    match compute_checksum(origin) {
                        Ok(actual) if actual != expected => log_event!(
                            self.ctx,
                            WARN,
                            event_names::ROLLBACK_COMPLETE,
                            self.state(),
                            "Restored file differs from backed-up origin",
                            expected = %expected,
                            actual = %actual
                        ),
                        _ => {}
                    }
                }
                log_event!(
                    self.ctx,
                    INFO,
                    event_names::ROLLBACK_COMPLETE,
                    self.state(),
                    "Previous version restored",
                    origin = %origin.display()
                );
                cause
            }
            Ok(RestoreOutcome::Skipped {
                origin_present,
                backup_present,
            }) => {
                log_event!(
                    self.ctx,
                    WARN,
                    event_names::ROLLBACK_SKIPPED,
                    self.state(),
                    "Nothing to restore",
                    origin_present = origin_present,
                    backup_present = backup_present
                );
                cause
            }
            Err(restore) => {
                log_event!(
                    self.ctx,
                    ERROR,
                    event_names::ROLLBACK_FAILED,
                    self.state(),
                    "Rollback failed; manual recovery required",
                    error = %restore
                );
                let details = format!("update error: {}\nrestore error: {}", cause, restore);
                let note = recovery_note_path(origin);
                if let Err(err) = write_recovery_instructions(&note, origin, backup, &details) {
                    log_event!(
                        self.ctx,
                        ERROR,
                        event_names::ROLLBACK_FAILED,
                        self.state(),
                        "Could not write recovery instructions",
                        path = %note.display(),
                        error = %err
                    );
                }
                UpdateError::RollbackFailed {
                    cause: Box::new(cause),
                    restore: Box::new(restore),
                }
            }
        }
    }

    fn remove_staging(&self, dir: &Path) -> Result<()> {
        match fs::remove_dir_all(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(UpdateError::fs(FsOp::RemoveStaging, dir, e)),
        }
        log_event!(
            self.ctx,
            DEBUG,
            event_names::STAGING_REMOVED,
            self.state(),
            "Staging directory removed",
            path = %dir.display()
        );
        Ok(())
    }

    fn report_failure(&self, err: &UpdateError) {
        log_event!(
            self.ctx,
            ERROR,
            event_names::UPDATE_FAILED,
            self.state(),
            "Update failed",
            error = %err,
            exit_code = err.exit_code().as_i32()
        );
    }
}

/// Manual restore of `<origin><suffix>`.
///
/// Without `force` this behaves like automatic rollback and refuses to touch
/// an existing origin.
pub fn rollback_origin(
    backups: &crate::install::BackupManager,
    origin: &Path,
    force: bool,
) -> Result<RestoreOutcome> {
    if force && origin.exists() {
        backups.force_restore(origin)?;
        return Ok(RestoreOutcome::Restored);
    }
    let backup = backups.backup_path(origin);
    match backups.restore(origin, &backup)? {
        RestoreOutcome::Skipped {
            backup_present: false,
            ..
        } => Err(UpdateError::fs(
            FsOp::Restore,
            backup,
            std::io::Error::new(std::io::ErrorKind::NotFound, "no backup present"),
        )),
        outcome => Ok(outcome),
    }
}
