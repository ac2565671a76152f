//! Correlation context and stable event names.

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const UPDATE_STARTED: &str = "update.started";
    pub const UPDATE_FINISHED: &str = "update.finished";
    pub const UPDATE_FAILED: &str = "update.failed";

    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const LOCK_ACQUIRED: &str = "lock.acquired";

    // Steps
    pub const WAIT_STARTED: &str = "wait.started";
    pub const WAIT_FINISHED: &str = "wait.finished";
    pub const EXTRACT_FINISHED: &str = "extract.finished";
    pub const BACKUP_CREATED: &str = "backup.created";
    pub const PLACE_FINISHED: &str = "place.finished";
    pub const ARCHIVE_DELETED: &str = "archive.deleted";
    pub const STAGING_REMOVED: &str = "staging.removed";
    pub const RELAUNCHED: &str = "relaunch.started";

    // Recovery
    pub const ROLLBACK_STARTED: &str = "rollback.started";
    pub const ROLLBACK_COMPLETE: &str = "rollback.complete";
    pub const ROLLBACK_SKIPPED: &str = "rollback.skipped";
    pub const ROLLBACK_FAILED: &str = "rollback.failed";
}

/// Correlation IDs attached to every orchestrator event.
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Unique ID for this invocation.
    pub run_id: String,
    /// Host identifier.
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            host_id: host_id.into(),
        }
    }

    /// Fresh run id on this host.
    pub fn for_current_run() -> Self {
        Self::new(super::generate_run_id(), super::get_host_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context() {
        let ctx = LogContext::new("run-abc", "host-xyz");
        assert_eq!(ctx.run_id, "run-abc");
        assert_eq!(ctx.host_id, "host-xyz");

        let fresh = LogContext::for_current_run();
        assert!(fresh.run_id.starts_with("run-"));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(event_names::BACKUP_CREATED, "backup.created");
        assert_eq!(event_names::ROLLBACK_COMPLETE, "rollback.complete");
    }
}
