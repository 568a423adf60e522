//! Local directory listing.

use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::InputError;
use crate::models::LocalTrackName;
use crate::normalize::is_audio_file;

/// File names of the audio files under `dir`, sorted by name. Only the top
/// level is read unless `recursive` is set. Non-audio files are skipped.
pub fn list_audio_files(dir: &Path, recursive: bool) -> Result<Vec<String>, InputError> {
    if !dir.exists() {
        return Err(InputError::NotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(InputError::NotADirectory(dir.to_path_buf()));
    }
    // Surface permission problems up front instead of as per-entry warnings
    std::fs::read_dir(dir).map_err(|e| InputError::Unreadable {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut walker = WalkDir::new(dir).min_depth(1).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            warn!(path = %entry.path().display(), "skipping non UTF-8 file name");
            continue;
        };
        if is_audio_file(name) {
            files.push(name.to_string());
        } else {
            debug!(file = name, "not an audio file");
        }
    }
    Ok(files)
}

/// List and normalize in one step.
pub fn load_local_names(dir: &Path, recursive: bool) -> Result<Vec<LocalTrackName>, InputError> {
    Ok(list_audio_files(dir, recursive)?
        .into_iter()
        .map(LocalTrackName::new)
        .collect())
}
