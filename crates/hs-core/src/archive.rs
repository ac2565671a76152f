//! Update archive extraction into a fresh staging directory.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{FsOp, Result, UpdateError};

/// Extracts an archive into a newly created, uniquely named directory.
pub trait ArchiveExtractor {
    /// Create a staging directory next to `archive` and extract into it.
    ///
    /// `on_created` is called as soon as the directory exists so the caller
    /// owns its cleanup even if extraction fails afterwards.
    fn extract(&self, archive: &Path, on_created: &mut dyn FnMut(&Path)) -> Result<PathBuf>;
}

/// ZIP extraction via the `zip` crate.
#[derive(Debug, Default, Clone)]
pub struct ZipExtractor;

impl ZipExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Create `<archive dir>/<uuid>`; fails if the name already exists.
    fn create_staging(archive: &Path) -> Result<PathBuf> {
        let parent = archive
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let staging = parent.join(Uuid::new_v4().to_string());
        fs::create_dir(&staging).map_err(|e| UpdateError::fs(FsOp::CreateStaging, &staging, e))?;
        Ok(staging)
    }
}

impl ArchiveExtractor for ZipExtractor {
    fn extract(&self, archive: &Path, on_created: &mut dyn FnMut(&Path)) -> Result<PathBuf> {
        let file = File::open(archive).map_err(|e| UpdateError::Archive {
            path: archive.to_path_buf(),
            source: zip::result::ZipError::Io(e),
        })?;
        let mut zip = zip::ZipArchive::new(file).map_err(|source| UpdateError::Archive {
            path: archive.to_path_buf(),
            source,
        })?;

        let staging = Self::create_staging(archive)?;
        on_created(&staging);
        debug!(
            target: "update.extract",
            staging = %staging.display(),
            entries = zip.len(),
            "Extracting archive"
        );

        zip.extract(&staging).map_err(|source| UpdateError::Archive {
            path: archive.to_path_buf(),
            source,
        })?;

        if !staging.is_dir() {
            return Err(UpdateError::ExtractionTargetMissing(staging));
        }

        info!(
            target: "update.extract",
            archive = %archive.display(),
            staging = %staging.display(),
            "Archive extracted"
        );
        Ok(staging)
    }
}
