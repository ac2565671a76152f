//! Exclusive run lock keyed by the origin path.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::compute_checksum_str;
use crate::error::{FsOp, Result, UpdateError};

/// Held for the whole run. Released on drop.
#[derive(Debug)]
pub struct UpdateLock {
    file: File,
    path: PathBuf,
}

impl UpdateLock {
    /// Lock file path for `origin` under `dir`.
    pub fn path_for(dir: &Path, origin: &Path) -> PathBuf {
        let digest = compute_checksum_str(&origin.to_string_lossy());
        dir.join(format!("{}.lock", &digest[..16]))
    }

    /// Take the lock without blocking.
    pub fn acquire(dir: &Path, origin: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| UpdateError::fs(FsOp::Lock, dir, e))?;
        let path = Self::path_for(dir, origin);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false) // Keep lock file contents (advisory lock only)
            .open(&path)
            .map_err(|e| UpdateError::fs(FsOp::Lock, &path, e))?;

        if let Err(err) = file.try_lock_exclusive() {
            if err.kind() == fs2::lock_contended_error().kind() {
                return Err(UpdateError::LockUnavailable(path));
            }
            return Err(UpdateError::fs(FsOp::Lock, &path, err));
        }

        // The lock is held either way; the pid is informational.
        if let Err(err) = write_pid(&file) {
            debug!(
                target: "update.lock",
                path = %path.display(),
                error = %err,
                "Could not record pid in lock file"
            );
        }

        debug!(target: "update.lock", path = %path.display(), "Lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Truncate the lock file and write our PID.
fn write_pid(file: &File) -> io::Result<()> {
    file.set_len(0)?;
    let mut writer = file;
    writeln!(writer, "{}", std::process::id())?;
    writer.flush()
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        // The file stays: deleting it would let a waiter lock an unlinked inode.
    }
}
