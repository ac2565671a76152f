//! Manual recovery instructions written when rollback itself fails.

use chrono::Utc;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// `<origin-filename>.RECOVERY.txt` next to the origin.
pub fn recovery_note_path(origin: &Path) -> PathBuf {
    let mut name = origin.file_name().unwrap_or_default().to_os_string();
    name.push(".RECOVERY.txt");
    origin.with_file_name(name)
}

/// Write manual recovery instructions to a file
pub fn write_recovery_instructions(
    path: &Path,
    origin: &Path,
    backup: &Path,
    details: &str,
) -> io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "hotswap recovery instructions")?;
    writeln!(file, "=============================")?;
    writeln!(file, "Written: {}", Utc::now().to_rfc3339())?;
    writeln!(file)?;
    writeln!(
        file,
        "The update failed and the previous version could not be restored automatically."
    )?;
    writeln!(file)?;
    writeln!(file, "Details:")?;
    writeln!(file, "{}", details)?;
    writeln!(file)?;
    writeln!(file, "To recover by hand:")?;
    writeln!(file)?;
    writeln!(file, "1. Make sure the application is not running.")?;
    writeln!(file, "2. Rename the backup back to the executable name:")?;
    writeln!(file, "     from: {}", backup.display())?;
    writeln!(file, "     to:   {}", origin.display())?;
    writeln!(
        file,
        "   or run: hotswap rollback --origin \"{}\" --force",
        origin.display()
    )?;
    writeln!(file, "3. Start the application again.")?;
    writeln!(file)?;
    writeln!(
        file,
        "If the backup file is missing, reinstall the application."
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_recovery_note_path() {
        assert_eq!(
            recovery_note_path(Path::new("/app/App.exe")),
            PathBuf::from("/app/App.exe.RECOVERY.txt")
        );
    }

    #[test]
    fn test_recovery_instructions() {
        let temp = TempDir::new().unwrap();
        let origin = temp.path().join("App.exe");
        let backup = temp.path().join("App.exe.bak");
        let note = recovery_note_path(&origin);

        write_recovery_instructions(&note, &origin, &backup, "restore failed: locked").unwrap();

        let content = std::fs::read_to_string(&note).unwrap();
        assert!(content.contains("recovery instructions"));
        assert!(content.contains("restore failed: locked"));
        assert!(content.contains("App.exe.bak"));
        assert!(content.contains("rollback --origin"));
    }
}
