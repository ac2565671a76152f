//! End-to-end orchestrator scenarios against real ZIP archives.
//!
//! Process waiting and relaunch are replaced by doubles; extraction,
//! backup, placement and cleanup run against a temp directory.

use hs_config::TerminationPolicy;
use hs_core::install::{recovery_note_path, BackupRecord};
use hs_core::logging::LogContext;
use hs_core::{
    BackupManager, BackupStore, DirectoryPlacer, ExitCode, FsOp, Launcher, ProcessWaiter,
    RestoreOutcome, UpdateError, UpdateLock, UpdateOrchestrator, UpdateSettings, UpdateState,
    WaitSummary, ZipExtractor,
};
use std::cell::{Cell, RefCell};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

// ============================================================================
// Doubles
// ============================================================================

#[derive(Default)]
struct FakeWaiter {
    calls: Cell<usize>,
    policies: RefCell<Vec<TerminationPolicy>>,
    times_out: bool,
}

impl ProcessWaiter for FakeWaiter {
    fn wait_for_exit(&self, name: &str, policy: TerminationPolicy) -> hs_core::Result<WaitSummary> {
        self.calls.set(self.calls.get() + 1);
        self.policies.borrow_mut().push(policy);
        if self.times_out {
            return Err(UpdateError::ProcessDidNotExit {
                name: name.to_string(),
                pid: 999,
                timeout: Duration::from_secs(5),
            });
        }
        Ok(WaitSummary {
            process_name: name.to_string(),
            matched: vec![999],
            ..WaitSummary::default()
        })
    }
}

#[derive(Default)]
struct FakeLauncher {
    launched: RefCell<Vec<(PathBuf, Vec<String>)>>,
}

impl Launcher for FakeLauncher {
    fn launch(&self, executable: &Path, args: &[String]) -> hs_core::Result<u32> {
        self.launched
            .borrow_mut()
            .push((executable.to_path_buf(), args.to_vec()));
        Ok(31337)
    }
}

/// Real backups, but every restore fails.
struct BrokenRestore(BackupManager);

impl BackupStore for BrokenRestore {
    fn backup_path(&self, origin: &Path) -> PathBuf {
        self.0.backup_path(origin)
    }

    fn backup(&self, origin: &Path) -> hs_core::Result<BackupRecord> {
        self.0.backup(origin)
    }

    fn restore(&self, _origin: &Path, backup: &Path) -> hs_core::Result<RestoreOutcome> {
        Err(UpdateError::fs(
            FsOp::Restore,
            backup,
            io::Error::new(io::ErrorKind::PermissionDenied, "still locked"),
        ))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

struct Install {
    _temp: TempDir,
    dir: PathBuf,
    origin: PathBuf,
    update: PathBuf,
}

fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options: FileOptions<'_, ()> =
        FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, body) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(body).unwrap();
    }
    zip.finish().unwrap();
}

/// `App/App.exe` ("old") and `App/update.zip` with App.exe + lib.dll.
fn install() -> Install {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("App");
    fs::create_dir(&dir).unwrap();
    let origin = dir.join("App.exe");
    fs::write(&origin, b"old app").unwrap();
    let update = dir.join("update.zip");
    write_zip(&update, &[("App.exe", b"new app"), ("lib.dll", b"new lib")]);
    Install {
        _temp: temp,
        dir,
        origin,
        update,
    }
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn ctx() -> LogContext {
    LogContext::new("run-test", "host-test")
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn happy_path_replaces_files_and_relaunches() {
    let app = install();
    let waiter = FakeWaiter::default();
    let extractor = ZipExtractor::new();
    let backups = BackupManager::default();
    let placer = DirectoryPlacer::default();
    let launcher = FakeLauncher::default();
    let settings = UpdateSettings {
        relaunch_args: vec!["--updated".to_string()],
        ..UpdateSettings::default()
    };

    let orchestrator =
        UpdateOrchestrator::new(&waiter, &extractor, &backups, &placer, &launcher, ctx())
            .with_settings(settings);
    let outcome = orchestrator.run_paths(&app.origin, &app.update).unwrap();

    assert_eq!(orchestrator.state(), UpdateState::Done);
    assert_eq!(fs::read(&app.origin).unwrap(), b"new app");
    assert_eq!(fs::read(app.dir.join("lib.dll")).unwrap(), b"new lib");
    assert_eq!(fs::read(app.dir.join("App.exe.bak")).unwrap(), b"old app");
    // Archive deleted, staging gone, backup retained.
    assert_eq!(listing(&app.dir), vec!["App.exe", "App.exe.bak", "lib.dll"]);

    assert_eq!(waiter.calls.get(), 1);
    assert_eq!(outcome.relaunched_pid, Some(31337));
    assert_eq!(
        launcher.launched.borrow().as_slice(),
        &[(app.origin.clone(), vec!["--updated".to_string()])]
    );
    assert_eq!(outcome.placed.len(), 2);
}

#[test]
fn tar_archive_fails_validation_without_side_effects() {
    let app = install();
    let tar = app.dir.join("update.tar");
    fs::rename(&app.update, &tar).unwrap();
    let before = listing(&app.dir);

    let waiter = FakeWaiter::default();
    let launcher = FakeLauncher::default();
    let backup_store = BackupManager::default();
    let dir_placer = DirectoryPlacer::default();
    let orchestrator = UpdateOrchestrator::new(
        &waiter,
        &ZipExtractor,
        &backup_store,
        &dir_placer,
        &launcher,
        ctx(),
    );

    let err = orchestrator.run_paths(&app.origin, &tar).unwrap_err();
    assert!(matches!(err, UpdateError::Validation(_)));
    assert_eq!(err.exit_code(), ExitCode::ArgsError);
    assert_eq!(waiter.calls.get(), 0);
    assert!(launcher.launched.borrow().is_empty());
    assert_eq!(listing(&app.dir), before);
}

#[test]
fn placement_failure_restores_origin_and_keeps_archive() {
    let app = install();
    // A non-empty directory where lib.dll must go makes the rename fail.
    fs::create_dir_all(app.dir.join("lib.dll").join("nested")).unwrap();

    let launcher = FakeLauncher::default();
    let backups = BackupManager::default();
    let fake_waiter = FakeWaiter::default();
    let dir_placer = DirectoryPlacer::default();
    let orchestrator = UpdateOrchestrator::new(
        &fake_waiter,
        &ZipExtractor,
        &backups,
        &dir_placer,
        &launcher,
        ctx(),
    );

    let err = orchestrator.run_paths(&app.origin, &app.update).unwrap_err();
    assert!(matches!(
        err,
        UpdateError::Filesystem {
            op: FsOp::Place,
            ..
        }
    ));
    assert_eq!(orchestrator.state(), UpdateState::ErrorRollback);

    assert_eq!(fs::read(&app.origin).unwrap(), b"old app");
    assert!(!app.dir.join("App.exe.bak").exists());
    assert!(app.update.exists());
    assert_eq!(listing(&app.dir), vec!["App.exe", "lib.dll", "update.zip"]);
    assert!(launcher.launched.borrow().is_empty());
}

#[test]
fn stale_backup_is_replaced() {
    let app = install();
    fs::write(app.dir.join("App.exe.bak"), b"ancient app").unwrap();

    let fake_waiter = FakeWaiter::default();
    let backup_store = BackupManager::default();
    let dir_placer = DirectoryPlacer::default();
    let fake_launcher = FakeLauncher::default();
    let orchestrator = UpdateOrchestrator::new(
        &fake_waiter,
        &ZipExtractor,
        &backup_store,
        &dir_placer,
        &fake_launcher,
        ctx(),
    );
    orchestrator.run_paths(&app.origin, &app.update).unwrap();

    assert_eq!(fs::read(app.dir.join("App.exe.bak")).unwrap(), b"old app");
}

#[test]
fn two_updates_in_sequence() {
    let app = install();
    let waiter = FakeWaiter::default();
    let backups = BackupManager::default();
    let placer = DirectoryPlacer::default();
    let launcher = FakeLauncher::default();
    let orchestrator =
        UpdateOrchestrator::new(&waiter, &ZipExtractor, &backups, &placer, &launcher, ctx());

    orchestrator.run_paths(&app.origin, &app.update).unwrap();
    write_zip(&app.update, &[("App.exe", b"newer app")]);
    orchestrator.run_paths(&app.origin, &app.update).unwrap();

    assert_eq!(fs::read(&app.origin).unwrap(), b"newer app");
    assert_eq!(fs::read(app.dir.join("App.exe.bak")).unwrap(), b"new app");
    assert_eq!(launcher.launched.borrow().len(), 2);
}

#[test]
fn wait_timeout_touches_nothing() {
    let app = install();
    let before = listing(&app.dir);
    let waiter = FakeWaiter {
        times_out: true,
        ..FakeWaiter::default()
    };
    let settings = UpdateSettings {
        termination: TerminationPolicy::Forced,
        ..UpdateSettings::default()
    };

    let backup_store = BackupManager::default();
    let dir_placer = DirectoryPlacer::default();
    let fake_launcher = FakeLauncher::default();
    let orchestrator = UpdateOrchestrator::new(
        &waiter,
        &ZipExtractor,
        &backup_store,
        &dir_placer,
        &fake_launcher,
        ctx(),
    )
    .with_settings(settings);

    let err = orchestrator.run_paths(&app.origin, &app.update).unwrap_err();
    assert_eq!(err.exit_code(), ExitCode::TimeoutError);
    assert_eq!(waiter.policies.borrow().as_slice(), &[TerminationPolicy::Forced]);
    assert_eq!(listing(&app.dir), before);
}

#[test]
fn corrupt_archive_leaves_no_staging_or_backup() {
    let app = install();
    fs::write(&app.update, b"PK but not really").unwrap();
    let before = listing(&app.dir);

    let fake_waiter = FakeWaiter::default();
    let backup_store = BackupManager::default();
    let dir_placer = DirectoryPlacer::default();
    let fake_launcher = FakeLauncher::default();
    let orchestrator = UpdateOrchestrator::new(
        &fake_waiter,
        &ZipExtractor,
        &backup_store,
        &dir_placer,
        &fake_launcher,
        ctx(),
    );

    let err = orchestrator.run_paths(&app.origin, &app.update).unwrap_err();
    assert_eq!(err.exit_code(), ExitCode::ArchiveError);
    assert_eq!(listing(&app.dir), before);
}

#[test]
fn extraction_failure_after_staging_created_removes_staging() {
    let app = install();
    // Stored entries keep their payload verbatim, so one flipped byte survives
    // the central directory read and only fails the CRC during extraction.
    let payload: &[u8] = b"new app payload for crc check";
    let mut zip = ZipWriter::new(File::create(&app.update).unwrap());
    let stored: FileOptions<'_, ()> =
        FileOptions::default().compression_method(CompressionMethod::Stored);
    zip.start_file("App.exe", stored).unwrap();
    zip.write_all(payload).unwrap();
    zip.finish().unwrap();

    let mut bytes = fs::read(&app.update).unwrap();
    let at = bytes
        .windows(payload.len())
        .position(|w| w == payload)
        .unwrap();
    bytes[at] ^= 0xff;
    fs::write(&app.update, &bytes).unwrap();

    let fake_waiter = FakeWaiter::default();
    let backup_store = BackupManager::default();
    let dir_placer = DirectoryPlacer::default();
    let fake_launcher = FakeLauncher::default();
    let orchestrator = UpdateOrchestrator::new(
        &fake_waiter,
        &ZipExtractor,
        &backup_store,
        &dir_placer,
        &fake_launcher,
        ctx(),
    );

    let err = orchestrator.run_paths(&app.origin, &app.update).unwrap_err();
    assert_eq!(err.exit_code(), ExitCode::ArchiveError);
    assert_eq!(listing(&app.dir), vec!["App.exe", "update.zip"]);
    assert_eq!(fs::read(&app.origin).unwrap(), b"old app");
    assert!(fake_launcher.launched.borrow().is_empty());
}

#[test]
fn archive_without_executable_is_rejected_before_backup() {
    let app = install();
    write_zip(&app.update, &[("lib.dll", b"new lib")]);

    let fake_waiter = FakeWaiter::default();
    let backup_store = BackupManager::default();
    let dir_placer = DirectoryPlacer::default();
    let fake_launcher = FakeLauncher::default();
    let orchestrator = UpdateOrchestrator::new(
        &fake_waiter,
        &ZipExtractor,
        &backup_store,
        &dir_placer,
        &fake_launcher,
        ctx(),
    );

    let err = orchestrator.run_paths(&app.origin, &app.update).unwrap_err();
    assert!(matches!(err, UpdateError::MissingExecutable { .. }));
    assert_eq!(listing(&app.dir), vec!["App.exe", "update.zip"]);
    assert_eq!(fs::read(&app.origin).unwrap(), b"old app");
}

#[test]
fn failed_restore_writes_recovery_note() {
    let app = install();
    fs::create_dir_all(app.dir.join("lib.dll").join("nested")).unwrap();
    let backups = BrokenRestore(BackupManager::default());

    let fake_waiter = FakeWaiter::default();
    let dir_placer = DirectoryPlacer::default();
    let fake_launcher = FakeLauncher::default();
    let orchestrator = UpdateOrchestrator::new(
        &fake_waiter,
        &ZipExtractor,
        &backups,
        &dir_placer,
        &fake_launcher,
        ctx(),
    );

    let err = orchestrator.run_paths(&app.origin, &app.update).unwrap_err();
    assert!(matches!(err, UpdateError::RollbackFailed { .. }));
    assert_eq!(err.exit_code(), ExitCode::RollbackError);

    // Origin is gone, backup survives, and the note tells the user what to do.
    assert!(!app.origin.exists());
    assert!(app.dir.join("App.exe.bak").exists());
    let note = fs::read_to_string(recovery_note_path(&app.origin)).unwrap();
    assert!(note.contains("App.exe.bak"));
    assert!(note.contains("still locked"));
}

#[test]
fn held_lock_blocks_second_run() {
    let app = install();
    let lock_dir = app.dir.parent().unwrap().join("locks");
    let _held = UpdateLock::acquire(&lock_dir, &app.origin).unwrap();
    let before = listing(&app.dir);

    let waiter = FakeWaiter::default();
    let settings = UpdateSettings {
        lock_dir: Some(lock_dir),
        ..UpdateSettings::default()
    };
    let backup_store = BackupManager::default();
    let dir_placer = DirectoryPlacer::default();
    let fake_launcher = FakeLauncher::default();
    let orchestrator = UpdateOrchestrator::new(
        &waiter,
        &ZipExtractor,
        &backup_store,
        &dir_placer,
        &fake_launcher,
        ctx(),
    )
    .with_settings(settings);

    let err = orchestrator.run_paths(&app.origin, &app.update).unwrap_err();
    assert_eq!(err.exit_code(), ExitCode::LockError);
    assert_eq!(waiter.calls.get(), 0);
    assert_eq!(listing(&app.dir), before);
}

#[test]
fn no_relaunch_setting_skips_launcher() {
    let app = install();
    let launcher = FakeLauncher::default();
    let settings = UpdateSettings {
        relaunch: false,
        ..UpdateSettings::default()
    };

    let fake_waiter = FakeWaiter::default();
    let backup_store = BackupManager::default();
    let dir_placer = DirectoryPlacer::default();
    let orchestrator = UpdateOrchestrator::new(
        &fake_waiter,
        &ZipExtractor,
        &backup_store,
        &dir_placer,
        &launcher,
        ctx(),
    )
    .with_settings(settings);

    let outcome = orchestrator.run_paths(&app.origin, &app.update).unwrap();
    assert_eq!(outcome.relaunched_pid, None);
    assert!(launcher.launched.borrow().is_empty());
}
