//! Waiting for the application being updated to exit.

use hs_config::TerminationPolicy;
use serde::Serialize;
use std::ffi::OsStr;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use crate::error::{Result, UpdateError};

/// Default per-instance wait bound.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default poll interval while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What the waiter observed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WaitSummary {
    pub process_name: String,
    /// PIDs that matched the name when the wait started.
    pub matched: Vec<u32>,
    /// PIDs a kill was delivered to.
    pub killed: Vec<u32>,
    pub elapsed_ms: u128,
}

/// Blocks until every instance of a named process has exited.
pub trait ProcessWaiter {
    /// No matching process is a success. Forced termination is attempted
    /// before the wait, never instead of it.
    fn wait_for_exit(&self, name: &str, policy: TerminationPolicy) -> Result<WaitSummary>;
}

/// Waiter backed by the OS process table.
#[derive(Debug, Clone)]
pub struct SystemProcessWaiter {
    timeout: Duration,
    poll_interval: Duration,
}

impl Default for SystemProcessWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_WAIT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

impl SystemProcessWaiter {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Block until `pid` is gone or reused by a process with another start time.
    fn wait_one(&self, system: &mut System, name: &str, pid: Pid, start_time: u64) -> Result<()> {
        let start = Instant::now();

        loop {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            let alive = system
                .process(pid)
                .map_or(false, |p| p.start_time() == start_time);
            if !alive {
                debug!(target: "update.wait", pid = pid.as_u32(), "Process exited");
                return Ok(());
            }
            if start.elapsed() >= self.timeout {
                return Err(UpdateError::ProcessDidNotExit {
                    name: name.to_string(),
                    pid: pid.as_u32(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(self.poll_interval);
        }
    }
}

impl ProcessWaiter for SystemProcessWaiter {
    fn wait_for_exit(&self, name: &str, policy: TerminationPolicy) -> Result<WaitSummary> {
        let wanted = strip_exe_suffix(name.trim());
        if wanted.is_empty() {
            return Err(UpdateError::ProcessQuery {
                name: name.to_string(),
                reason: "empty process name".to_string(),
            });
        }

        let started = Instant::now();
        let own_pid = std::process::id();
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let mut targets: Vec<(Pid, u64)> = system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != own_pid)
            .filter(|(_, p)| matches_name(wanted, p.name(), p.exe()))
            .map(|(pid, p)| (*pid, p.start_time()))
            .collect();
        targets.sort_by_key(|(pid, _)| pid.as_u32());

        let mut summary = WaitSummary {
            process_name: wanted.to_string(),
            matched: targets.iter().map(|(pid, _)| pid.as_u32()).collect(),
            ..WaitSummary::default()
        };

        if targets.is_empty() {
            debug!(target: "update.wait", name = wanted, "No running instances");
            return Ok(summary);
        }

        info!(
            target: "update.wait",
            name = wanted,
            instances = targets.len(),
            policy = %policy,
            "Waiting for process exit"
        );

        if policy == TerminationPolicy::Forced {
            for (pid, _) in &targets {
                match system.process(*pid) {
                    Some(p) if p.kill() => summary.killed.push(pid.as_u32()),
                    // Already gone or not ours to kill; the wait decides.
                    _ => debug!(target: "update.wait", pid = pid.as_u32(), "Kill not delivered"),
                }
            }
        }

        for (pid, start_time) in &targets {
            if let Err(err) = self.wait_one(&mut system, wanted, *pid, *start_time) {
                warn!(target: "update.wait", pid = pid.as_u32(), error = %err, "Process still running");
                return Err(err);
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis();
        Ok(summary)
    }
}

fn strip_exe_suffix(name: &str) -> &str {
    let len = name.len();
    if len > 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".exe") {
        &name[..len - 4]
    } else {
        name
    }
}

fn names_equal(a: &str, b: &str) -> bool {
    if cfg!(windows) {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

/// Match on the process name or the executable's file stem.
fn matches_name(wanted: &str, proc_name: &OsStr, exe: Option<&Path>) -> bool {
    let proc_name = proc_name.to_string_lossy();
    if names_equal(wanted, strip_exe_suffix(&proc_name)) {
        return true;
    }
    exe.and_then(|path| path.file_name())
        .map(|file| names_equal(wanted, strip_exe_suffix(&file.to_string_lossy())))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_exe_suffix() {
        assert_eq!(strip_exe_suffix("WowUp.exe"), "WowUp");
        assert_eq!(strip_exe_suffix("WowUp.EXE"), "WowUp");
        assert_eq!(strip_exe_suffix("WowUp"), "WowUp");
        assert_eq!(strip_exe_suffix(".exe"), ".exe");
    }

    #[test]
    fn test_matches_name_by_process_name() {
        assert!(matches_name("WowUp", OsStr::new("WowUp.exe"), None));
        assert!(matches_name("WowUp", OsStr::new("WowUp"), None));
        assert!(!matches_name("WowUp", OsStr::new("WowUpHelper"), None));
    }

    #[test]
    fn test_matches_name_by_exe_stem() {
        // Linux truncates comm names; the exe path still identifies it.
        let exe = Path::new("/opt/app/VeryLongApplicationName");
        assert!(matches_name(
            "VeryLongApplicationName",
            OsStr::new("VeryLongApplica"),
            Some(exe)
        ));
    }

    #[test]
    fn test_no_instances_is_vacuous_success() {
        let waiter = SystemProcessWaiter::new(Duration::from_millis(200), Duration::from_millis(20));
        let summary = waiter
            .wait_for_exit("hotswap-no-such-process-7d1f", TerminationPolicy::Forced)
            .unwrap();
        assert!(summary.matched.is_empty());
        assert!(summary.killed.is_empty());
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let err = SystemProcessWaiter::default()
            .wait_for_exit("  ", TerminationPolicy::Graceful)
            .unwrap_err();
        assert!(matches!(err, UpdateError::ProcessQuery { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_waits_for_child_and_times_out() {
        use std::process::Command;

        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = Pid::from_u32(child.id());
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let start_time = system.process(pid).map(|p| p.start_time()).unwrap();

        let waiter = SystemProcessWaiter::new(Duration::from_millis(150), Duration::from_millis(25));
        let err = waiter
            .wait_one(&mut system, "sleep", pid, start_time)
            .unwrap_err();
        assert!(matches!(err, UpdateError::ProcessDidNotExit { .. }));

        child.kill().unwrap();
        child.wait().unwrap();
        assert!(waiter.wait_one(&mut system, "sleep", pid, start_time).is_ok());
    }
}
