//! Filesystem side of an update: backup, placement, run lock, recovery notes.
//!
//! This module provides:
//! - Moving the origin executable aside and restoring it
//! - Verified placement of staged files into the install directory
//! - An exclusive per-target lock for the duration of a run
//! - Manual recovery instructions when automatic rollback fails

mod backup;
mod lock;
mod placement;
mod recovery;

pub use backup::{BackupManager, BackupRecord, BackupStore, RestoreOutcome};
pub use lock::UpdateLock;
pub use placement::{DirectoryPlacer, FilePlacer};
pub use recovery::{recovery_note_path, write_recovery_instructions};

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Default backup suffix appended to the origin file name.
pub const DEFAULT_BACKUP_SUFFIX: &str = ".bak";

/// Default lock directory: `<cache dir>/hotswap/locks`.
pub fn default_lock_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("hotswap")
        .join("locks")
}

/// SHA-256 of a file as lowercase hex, plus its size in bytes.
pub fn file_digest(path: &Path) -> io::Result<(String, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    let mut size = 0u64;

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        size += bytes_read as u64;
        hasher.update(&buffer[..bytes_read]);
    }

    Ok((format!("{:x}", hasher.finalize()), size))
}

/// SHA-256 of a file as lowercase hex.
pub fn compute_checksum(path: &Path) -> io::Result<String> {
    file_digest(path).map(|(checksum, _)| checksum)
}

pub(crate) fn compute_checksum_str(value: &str) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_digest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("payload");
        std::fs::write(&path, b"hello").unwrap();

        let (checksum, size) = file_digest(&path).unwrap();
        assert_eq!(size, 5);
        assert_eq!(
            checksum,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(compute_checksum(&path).unwrap(), checksum);
    }
}
