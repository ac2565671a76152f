//! Placing staged files into the install directory.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::file_digest;
use crate::error::{FsOp, Result, UpdateError};

/// Copies staged content over the install directory.
pub trait FilePlacer {
    /// Place every top-level entry of `source` into `target`, overwriting
    /// same-named files. The entry named `executable` is placed last.
    /// Returns the target paths of every file written.
    fn place(&self, source: &Path, target: &Path, executable: &OsStr) -> Result<Vec<PathBuf>>;
}

/// Copy-verify-rename placer.
#[derive(Debug, Clone)]
pub struct DirectoryPlacer {
    verify: bool,
}

impl Default for DirectoryPlacer {
    fn default() -> Self {
        Self { verify: true }
    }
}

impl DirectoryPlacer {
    pub fn new(verify: bool) -> Self {
        Self { verify }
    }

    fn place_tree(&self, source: &Path, target: &Path, placed: &mut Vec<PathBuf>) -> Result<()> {
        fs::create_dir_all(target).map_err(|e| UpdateError::fs(FsOp::Place, target, e))?;
        for entry in sorted_entries(source, None)? {
            let dest = target.join(entry.file_name().unwrap_or_default());
            if entry.is_dir() {
                self.place_tree(&entry, &dest, placed)?;
            } else {
                self.place_file(&entry, &dest, false)?;
                placed.push(dest);
            }
        }
        Ok(())
    }

    /// Copy to a hidden sibling, verify, then rename over `dest`.
    fn place_file(&self, src: &Path, dest: &Path, executable: bool) -> Result<()> {
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let temp_path = dir.join(format!(
            ".{}.hotswap.{}",
            dest.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id()
        ));

        let result = self.copy_verified(src, &temp_path, executable).and_then(|()| {
            fs::rename(&temp_path, dest).map_err(|e| UpdateError::fs(FsOp::Place, dest, e))
        });

        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result?;

        debug!(target: "update.place", path = %dest.display(), "Placed file");
        Ok(())
    }

    fn copy_verified(&self, src: &Path, temp_path: &Path, executable: bool) -> Result<()> {
        fs::copy(src, temp_path).map_err(|e| UpdateError::fs(FsOp::Place, temp_path, e))?;

        if self.verify {
            let (expected, expected_size) =
                file_digest(src).map_err(|e| UpdateError::fs(FsOp::Place, src, e))?;
            let (actual, actual_size) =
                file_digest(temp_path).map_err(|e| UpdateError::fs(FsOp::Place, temp_path, e))?;
            if expected != actual || expected_size != actual_size {
                return Err(UpdateError::PlacementMismatch {
                    path: temp_path.to_path_buf(),
                    expected: format!("{} ({} bytes)", expected, expected_size),
                    actual: format!("{} ({} bytes)", actual, actual_size),
                });
            }
        }

        #[cfg(unix)]
        if executable {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(temp_path, fs::Permissions::from_mode(0o755))
                .map_err(|e| UpdateError::fs(FsOp::Place, temp_path, e))?;
        }
        #[cfg(not(unix))]
        let _ = executable;

        Ok(())
    }
}

impl FilePlacer for DirectoryPlacer {
    fn place(&self, source: &Path, target: &Path, executable: &OsStr) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(target).map_err(|e| UpdateError::fs(FsOp::Place, target, e))?;
        let mut placed = Vec::new();

        for entry in sorted_entries(source, Some(executable))? {
            let name = entry.file_name().unwrap_or_default();
            let dest = target.join(name);
            if entry.is_dir() {
                self.place_tree(&entry, &dest, &mut placed)?;
            } else {
                self.place_file(&entry, &dest, is_entry_named(name, executable))?;
                placed.push(dest);
            }
        }

        info!(
            target: "update.place",
            target_dir = %target.display(),
            files = placed.len(),
            verified = self.verify,
            "Placement complete"
        );
        Ok(placed)
    }
}

/// Whether names on the install filesystem compare without regard to case.
const CASE_INSENSITIVE_NAMES: bool = cfg!(any(windows, target_os = "macos"));

/// `name` refers to the same directory entry as `wanted` on this platform.
fn is_entry_named(name: &OsStr, wanted: &OsStr) -> bool {
    names_match(name, wanted, CASE_INSENSITIVE_NAMES)
}

fn names_match(name: &OsStr, wanted: &OsStr, ignore_case: bool) -> bool {
    if ignore_case {
        name.eq_ignore_ascii_case(wanted)
    } else {
        name == wanted
    }
}

/// Directory entries sorted by name, with `last` (if present) moved to the end.
fn sorted_entries(dir: &Path, last: Option<&OsStr>) -> Result<Vec<PathBuf>> {
    let read = fs::read_dir(dir).map_err(|e| UpdateError::fs(FsOp::Place, dir, e))?;
    let mut entries = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| UpdateError::fs(FsOp::Place, dir, e))?;
        entries.push(entry.path());
    }
    order_entries(&mut entries, last, CASE_INSENSITIVE_NAMES);
    Ok(entries)
}

fn order_entries(entries: &mut [PathBuf], last: Option<&OsStr>, ignore_case: bool) {
    let is_last = |path: &Path| match (last, path.file_name()) {
        (Some(wanted), Some(name)) => names_match(name, wanted, ignore_case),
        _ => false,
    };
    entries.sort_by(|a, b| is_last(a).cmp(&is_last(b)).then_with(|| a.cmp(b)));
}
