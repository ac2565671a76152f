//! Structured logging for hotswap.
//!
//! Provides dual-mode logging on stderr:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSON lines for wrappers that parse the updater's output
//!
//! plus an optional daily-rolling file sink with capped retention.
//!
//! # Usage
//!
//! ```ignore
//! use hs_core::logging::{init_logging, LogConfig, LogContext};
//!
//! let config = LogConfig::from_env(None, None);
//! let _guard = init_logging(&config);
//!
//! let ctx = LogContext::for_current_run();
//! log_event!(ctx, INFO, event_names::UPDATE_STARTED, UpdateState::Idle, "Starting update");
//! ```
//!
//! The returned [`LogGuard`] must live until the process exits; dropping it
//! flushes the file sink.

pub mod config;
pub mod events;

pub use config::{FileSink, LogConfig, LogFormat, LogLevel};
pub use events::{event_names, LogContext};

use std::io::IsTerminal;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder as RollingBuilder, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Keeps the file writer alive. Flushes on drop.
#[derive(Debug, Default)]
pub struct LogGuard {
    file: Option<WorkerGuard>,
    /// Set when the file sink could not be opened.
    pub file_error: Option<String>,
}

impl LogGuard {
    pub fn has_file_sink(&self) -> bool {
        self.file.is_some()
    }
}

/// Initialize the logging subsystem.
///
/// Call once at startup. A second call leaves the first subscriber in place.
pub fn init_logging(config: &LogConfig) -> LogGuard {
    let mut guard = LogGuard::default();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            layers.push(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_ansi(use_ansi)
                    .boxed(),
            );
        }
        LogFormat::Jsonl => {
            layers.push(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false)
                    .boxed(),
            );
        }
    }

    if let Some(sink) = &config.file {
        let appender = std::fs::create_dir_all(&sink.dir)
            .map_err(|e| e.to_string())
            .and_then(|()| {
                RollingBuilder::new()
                    .rotation(Rotation::DAILY)
                    .filename_prefix(sink.prefix.as_str())
                    .filename_suffix("log")
                    .max_log_files(sink.retention.max(1))
                    .build(&sink.dir)
                    .map_err(|e| e.to_string())
            });
        match appender {
            Ok(appender) => {
                let (writer, worker) = tracing_appender::non_blocking(appender);
                layers.push(fmt::layer().with_writer(writer).with_ansi(false).boxed());
                guard.file = Some(worker);
            }
            Err(err) => guard.file_error = Some(err),
        }
    }

    let filter = EnvFilter::new(config.level.to_string());
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();

    if let Some(err) = &guard.file_error {
        tracing::warn!(error = %err, "Log file sink unavailable; logging to stderr only");
    }
    guard
}

/// Generate a unique run ID for this invocation.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    // Shorten to first 12 hex chars for readability
    format!("run-{}", &uuid.simple().to_string()[..12])
}

/// Get the host ID for logging.
///
/// Uses machine-id on Linux, otherwise a digest of the host name.
pub fn get_host_id() -> String {
    if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
        let id = id.trim();
        if id.len() >= 8 {
            return format!("host-{}", &id[..8]);
        }
    }

    let hostname = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|h| !h.is_empty());
    if let Some(hostname) = hostname {
        let digest = crate::install::compute_checksum_str(&hostname);
        return format!("host-{}", &digest[..8]);
    }

    format!("host-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

/// Convenience macro for structured event logging with context.
///
/// Usage:
/// ```ignore
/// log_event!(ctx, INFO, event_names::BACKUP_CREATED, state, "Backup created");
/// log_event!(ctx, WARN, event_names::ROLLBACK_SKIPPED, state, "Nothing to restore",
///     origin = %origin.display(), origin_present = true);
/// ```
#[macro_export]
macro_rules! log_event {
    ($ctx:expr, INFO, $event:expr, $stage:expr, $msg:expr $(, $($field:tt)+)?) => {
        tracing::info!(
            target: $event,
            run_id = %$ctx.run_id,
            host_id = %$ctx.host_id,
            stage = %$stage,
            message = %$msg
            $(, $($field)+)?
        )
    };
    ($ctx:expr, DEBUG, $event:expr, $stage:expr, $msg:expr $(, $($field:tt)+)?) => {
        tracing::debug!(
            target: $event,
            run_id = %$ctx.run_id,
            host_id = %$ctx.host_id,
            stage = %$stage,
            message = %$msg
            $(, $($field)+)?
        )
    };
    ($ctx:expr, WARN, $event:expr, $stage:expr, $msg:expr $(, $($field:tt)+)?) => {
        tracing::warn!(
            target: $event,
            run_id = %$ctx.run_id,
            host_id = %$ctx.host_id,
            stage = %$stage,
            message = %$msg
            $(, $($field)+)?
        )
    };
    ($ctx:expr, ERROR, $event:expr, $stage:expr, $msg:expr $(, $($field:tt)+)?) => {
        tracing::error!(
            target: $event,
            run_id = %$ctx.run_id,
            host_id = %$ctx.host_id,
            stage = %$stage,
            message = %$msg
            $(, $($field)+)?
        )
    };
}
