//! Validated update inputs.
//!
//! An [`UpdateRequest`] can only be built through [`UpdateRequest::validate`],
//! which checks existence, file type and extension of both paths without
//! touching the filesystem beyond metadata reads.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ValidationError;

/// Extension rules applied during validation.
#[derive(Debug, Clone)]
pub struct ExtensionRules {
    /// Accepted origin extensions, lowercase without leading dot.
    pub origin: Vec<String>,
    /// Accepted archive extensions, lowercase without leading dot.
    pub archive: Vec<String>,
}

impl Default for ExtensionRules {
    fn default() -> Self {
        Self {
            origin: vec!["exe".to_string()],
            archive: vec!["zip".to_string()],
        }
    }
}

impl ExtensionRules {
    pub fn from_config(config: &hs_config::UpdaterConfig) -> Self {
        Self {
            origin: config.normalized_origin_extensions(),
            archive: config.normalized_archive_extensions(),
        }
    }

    fn describe(list: &[String]) -> String {
        list.iter()
            .map(|e| format!(".{}", e))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Origin executable and update archive, both checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    origin: PathBuf,
    update: PathBuf,
}

impl UpdateRequest {
    /// Validate both paths. Origin is checked first.
    pub fn validate(
        origin: &Path,
        update: &Path,
        rules: &ExtensionRules,
    ) -> Result<Self, ValidationError> {
        let origin_meta =
            fs::metadata(origin).map_err(|_| ValidationError::OriginNotFound(origin.to_path_buf()))?;
        if !origin_meta.is_file() {
            return Err(ValidationError::OriginNotAFile(origin.to_path_buf()));
        }
        if !is_executable_path(origin, &origin_meta, &rules.origin) {
            return Err(ValidationError::OriginExtension {
                path: origin.to_path_buf(),
                expected: ExtensionRules::describe(&rules.origin),
            });
        }
        let update_meta =
            fs::metadata(update).map_err(|_| ValidationError::UpdateNotFound(update.to_path_buf()))?;
        if !update_meta.is_file() {
            return Err(ValidationError::UpdateNotAFile(update.to_path_buf()));
        }
        if !has_extension(update, &rules.archive) {
            return Err(ValidationError::UpdateExtension {
                path: update.to_path_buf(),
                expected: ExtensionRules::describe(&rules.archive),
            });
        }

        let origin = absolute(origin)?;
        let update = absolute(update)?;
        Ok(Self { origin, update })
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn update(&self) -> &Path {
        &self.update
    }

    /// Directory the origin lives in; the placement target.
    pub fn origin_dir(&self) -> &Path {
        // `absolute` guarantees a parent.
        self.origin.parent().unwrap_or_else(|| Path::new("/"))
    }

    pub fn origin_file_name(&self) -> &OsStr {
        self.origin.file_name().unwrap_or_default()
    }

    /// Logical process name derived from the origin file stem.
    pub fn default_process_name(&self) -> String {
        self.origin
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ValidationError> {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .map_err(|_| ValidationError::NoParentDirectory(path.to_path_buf()))?
    };
    match abs.parent() {
        Some(p) if !p.as_os_str().is_empty() => Ok(abs),
        _ => Err(ValidationError::NoParentDirectory(path.to_path_buf())),
    }
}

/// Case-insensitive extension match.
pub fn has_extension(path: &Path, allowed: &[String]) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .map_or(false, |ext| allowed.iter().any(|a| *a == ext))
}

/// On Unix an extensionless file with an execute bit is also accepted.
fn is_executable_path(path: &Path, meta: &fs::Metadata, allowed: &[String]) -> bool {
    if has_extension(path, allowed) {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.extension().is_none() && meta.permissions().mode() & 0o111 != 0 {
            return true;
        }
    }
    #[cfg(not(unix))]
    let _ = meta;
    false
}
