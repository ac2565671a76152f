//! Hotswap - self-update helper
//!
//! The main entry point for the `hotswap` binary, handling:
//! - `apply`: wait for the app, swap in the update, relaunch
//! - `check`: validate inputs without touching anything
//! - `rollback`: restore the backed-up executable by hand

use clap::{Args, Parser, Subcommand};
use hs_config::{validate_config, TerminationPolicy, UpdaterConfig};
use hs_core::exit_codes::ExitCode;
use hs_core::install::BackupStore;
use hs_core::logging::{
    event_names, init_logging, FileSink, LogConfig, LogContext, LogFormat, LogLevel,
};
use hs_core::{
    rollback_origin, BackupManager, DetachedLauncher, DirectoryPlacer, ExtensionRules,
    RestoreOutcome, SystemProcessWaiter, UpdateOrchestrator, UpdateRequest, UpdateSettings,
    ZipExtractor,
};
use std::path::PathBuf;
use std::time::Duration;

/// Replace a running application's executable with an update and restart it
#[derive(Parser)]
#[command(name = "hotswap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for daily-rolling log files
    #[arg(long, global = true, env = "HOTSWAP_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for the application to exit, install the update and relaunch it
    Apply(ApplyArgs),

    /// Validate origin and update paths without side effects
    Check(CheckArgs),

    /// Restore `<origin>.bak` over the origin
    Rollback(RollbackArgs),
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Path to the current executable
    #[arg(long, short = 'o')]
    origin: PathBuf,

    /// Path to the downloaded update archive
    #[arg(long, short = 'u')]
    update: PathBuf,

    /// Process name to wait for (defaults to the origin file stem)
    #[arg(long)]
    process_name: Option<String>,

    /// Kill running instances before waiting
    #[arg(long)]
    force: bool,

    /// Per-instance wait timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Delay before starting, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Do not start the application afterwards
    #[arg(long)]
    no_relaunch: bool,

    /// Skip the per-target run lock
    #[arg(long)]
    no_lock: bool,

    /// Arguments passed to the relaunched application
    #[arg(last = true)]
    args: Vec<String>,
}

#[derive(Args, Debug)]
struct CheckArgs {
    #[arg(long, short = 'o')]
    origin: PathBuf,

    #[arg(long, short = 'u')]
    update: PathBuf,
}

#[derive(Args, Debug)]
struct RollbackArgs {
    /// Path to the executable to restore
    #[arg(long, short = 'o')]
    origin: PathBuf,

    /// Replace the origin even if it exists
    #[arg(long)]
    force: bool,
}

fn main() {
    let cli = Cli::parse();

    let loaded = match UpdaterConfig::load(cli.global.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("hotswap: {}", err);
            std::process::exit(ExitCode::ConfigError.as_i32());
        }
    };

    let log_config = build_log_config(&cli.global, &loaded.config);
    let guard = init_logging(&log_config);
    tracing::debug!(
        target: event_names::CONFIG_LOADED,
        source = %loaded.source,
        path = ?loaded.path,
        "Configuration loaded"
    );

    let exit_code = match &cli.command {
        Commands::Apply(args) => run_apply(loaded.config, args),
        Commands::Check(args) => run_check(&loaded.config, args),
        Commands::Rollback(args) => run_rollback(&loaded.config, args),
    };

    if !exit_code.is_success() {
        tracing::debug!(exit_code = %exit_code, "Exiting with failure");
    }

    // Flush the file sink before exiting.
    drop(guard);
    std::process::exit(exit_code.as_i32());
}

fn build_log_config(global: &GlobalOpts, config: &UpdaterConfig) -> LogConfig {
    let cli_level = if global.quiet {
        Some(LogLevel::Error)
    } else if global.verbose > 0 {
        Some(LogLevel::Info.more_verbose(global.verbose))
    } else {
        None
    };

    let mut log_config = LogConfig::from_env(cli_level, global.log_format);
    let dir = global.log_dir.clone().or_else(|| config.logging.dir.clone());
    if let Some(dir) = dir {
        log_config = log_config.with_file(FileSink::from_settings(&config.logging, dir));
    }
    log_config
}

/// Fold CLI overrides into the loaded config.
fn apply_overrides(mut config: UpdaterConfig, args: &ApplyArgs) -> UpdaterConfig {
    if let Some(name) = &args.process_name {
        config.process_name = Some(name.clone());
    }
    if args.force {
        config.termination = TerminationPolicy::Forced;
    }
    if let Some(timeout) = args.timeout_ms {
        config.wait_timeout_ms = timeout;
        config.poll_interval_ms = config.poll_interval_ms.min(timeout.max(1));
    }
    if let Some(delay) = args.delay_ms {
        config.startup_delay_ms = delay;
    }
    if args.no_relaunch {
        config.relaunch.enabled = false;
    }
    if args.no_lock {
        config.lock.enabled = false;
    }
    if !args.args.is_empty() {
        config.relaunch.args = args.args.clone();
    }
    config
}

fn run_apply(config: UpdaterConfig, args: &ApplyArgs) -> ExitCode {
    let config = apply_overrides(config, args);
    if let Err(err) = validate_config(&config) {
        tracing::error!(error = %err, "Invalid options");
        return ExitCode::ArgsError;
    }

    let waiter = SystemProcessWaiter::new(
        Duration::from_millis(config.wait_timeout_ms),
        Duration::from_millis(config.poll_interval_ms),
    );
    let extractor = ZipExtractor::new();
    let backups = BackupManager::new(&config.backup_suffix);
    let placer = DirectoryPlacer::new(config.verify_placement);
    let launcher = DetachedLauncher::new();

    let orchestrator = UpdateOrchestrator::new(
        &waiter,
        &extractor,
        &backups,
        &placer,
        &launcher,
        LogContext::for_current_run(),
    )
    .with_settings(UpdateSettings::from_config(&config));

    match orchestrator.run_paths(&args.origin, &args.update) {
        Ok(_) => ExitCode::Clean,
        Err(err) => err.exit_code(),
    }
}

fn run_check(config: &UpdaterConfig, args: &CheckArgs) -> ExitCode {
    let rules = ExtensionRules::from_config(config);
    let backups = BackupManager::new(&config.backup_suffix);

    match UpdateRequest::validate(&args.origin, &args.update, &rules) {
        Ok(request) => {
            let process_name = config
                .process_name
                .clone()
                .unwrap_or_else(|| request.default_process_name());
            let report = serde_json::json!({
                "check": "inputs",
                "status": "ok",
                "origin": request.origin().display().to_string(),
                "update": request.update().display().to_string(),
                "process_name": process_name,
                "backup_present": backups.backup_path(request.origin()).exists(),
            });
            println!("{}", report);
            ExitCode::Clean
        }
        Err(err) => {
            let code = ExitCode::ArgsError;
            let report = serde_json::json!({
                "check": "inputs",
                "status": "error",
                "code": code.code_name(),
                "exit_code": code.as_i32(),
                "error": err.to_string(),
            });
            println!("{}", report);
            code
        }
    }
}

fn run_rollback(config: &UpdaterConfig, args: &RollbackArgs) -> ExitCode {
    let backups = BackupManager::new(&config.backup_suffix);

    match rollback_origin(&backups, &args.origin, args.force) {
        Ok(RestoreOutcome::Restored) => {
            tracing::info!(
                target: event_names::ROLLBACK_COMPLETE,
                origin = %args.origin.display(),
                "Backup restored"
            );
            ExitCode::Clean
        }
        Ok(RestoreOutcome::Skipped { .. }) => {
            tracing::error!(
                target: event_names::ROLLBACK_SKIPPED,
                origin = %args.origin.display(),
                "Origin exists; pass --force to replace it with the backup"
            );
            ExitCode::ArgsError
        }
        Err(err) => {
            tracing::error!(
                target: event_names::ROLLBACK_FAILED,
                error = %err,
                "Rollback failed"
            );
            err.exit_code()
        }
    }
}
