//! Relaunching the updated executable.

use std::path::Path;
use std::process::{Command, Stdio};
use tracing::info;

use crate::error::{Result, UpdateError};

#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Starts a program without waiting for it.
pub trait Launcher {
    /// Returns the pid of the started process.
    fn launch(&self, executable: &Path, args: &[String]) -> Result<u32>;
}

/// Spawns the executable detached from the updater: own process group,
/// null stdio, working directory set to the executable's directory.
#[derive(Debug, Default, Clone)]
pub struct DetachedLauncher;

impl DetachedLauncher {
    pub fn new() -> Self {
        Self
    }

    fn command(executable: &Path, args: &[String]) -> Command {
        let mut cmd = Command::new(executable);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = executable.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        cmd
    }
}

impl Launcher for DetachedLauncher {
    fn launch(&self, executable: &Path, args: &[String]) -> Result<u32> {
        let child = Self::command(executable, args)
            .spawn()
            .map_err(|source| UpdateError::Launch {
                path: executable.to_path_buf(),
                source,
            })?;
        let pid = child.id();
        // Not waited on: the child outlives the updater.
        drop(child);

        info!(
            target: "update.relaunch",
            executable = %executable.display(),
            pid,
            "Relaunched application"
        );
        Ok(pid)
    }
}
