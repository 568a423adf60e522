//! Safety checks before the match log is created.
//!
//! The log file is truncated on open, so it must never point at one of the
//! user's audio files or at anything that is not a plain CSV path.

use anyhow::{bail, Result};
use std::path::Path;

use crate::normalize::is_audio_file;

/// Validates that a log path is safe to overwrite.
///
/// Checks:
/// - Log cannot carry an audio extension (listed sources always do)
/// - Log file name must end in `.csv`
/// - Log cannot be an existing directory
pub fn validate_log_path(output: &Path) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if is_audio_file(output_name) {
        bail!(
            "Safety check failed: log '{}' looks like an audio file",
            output.display()
        );
    }

    let is_csv = output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
        bail!(
            "Safety check failed: log '{}' must have a .csv extension",
            output.display()
        );
    }

    if output.is_dir() {
        bail!(
            "Safety check failed: log '{}' is a directory",
            output.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_log_path() {
        let output = PathBuf::from("/tmp/Log_MusicProject.csv");
        assert!(validate_log_path(&output).is_ok());
    }

    #[test]
    fn test_missing_csv_extension() {
        let output = PathBuf::from("/tmp/log.txt");
        assert!(validate_log_path(&output)
            .unwrap_err()
            .to_string()
            .contains("must have a .csv extension"));
    }

    #[test]
    fn test_audio_file_blocked() {
        let output = PathBuf::from("/music/song.MP3");
        assert!(validate_log_path(&output)
            .unwrap_err()
            .to_string()
            .contains("looks like an audio file"));
    }

    #[test]
    fn test_directory_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("logs.csv");
        std::fs::create_dir(&output).unwrap();
        assert!(validate_log_path(&output)
            .unwrap_err()
            .to_string()
            .contains("is a directory"));
    }
}
