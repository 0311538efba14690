//! Saved stories: user-chosen copies of story files in a separate directory.

use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::error::SaveError;
use crate::stories::create_private_dir;
use crate::stories::naming::STORY_EXTENSION;

/// Reject anything that is not a bare `*.json` filename.
///
/// Runs before any filesystem access, so a rejected name never touches disk.
pub fn validate_filename(filename: &str) -> Result<(), SaveError> {
    let invalid = || SaveError::InvalidFilename(filename.to_string());

    if filename.is_empty()
        || filename.contains("..")
        || filename.contains(['/', '\\', '\0'])
        || !filename.ends_with(STORY_EXTENSION)
        || has_drive_prefix(filename)
    {
        return Err(invalid());
    }

    let path = Path::new(filename);
    if path.is_absolute() || path.file_name().and_then(|n| n.to_str()) != Some(filename) {
        return Err(invalid());
    }
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}

/// `C:name` style volume prefixes.
fn has_drive_prefix(filename: &str) -> bool {
    let bytes = filename.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Copies of story files, kept apart from the regenerated story directory.
#[derive(Debug, Clone)]
pub struct SavedStore {
    story_dir: PathBuf,
    saved_dir: PathBuf,
}

impl SavedStore {
    pub fn new(story_dir: impl Into<PathBuf>, saved_dir: impl Into<PathBuf>) -> Self {
        Self {
            story_dir: story_dir.into(),
            saved_dir: saved_dir.into(),
        }
    }

    pub fn saved_dir(&self) -> &Path {
        &self.saved_dir
    }

    /// Filenames currently saved. Empty when the directory does not exist.
    pub fn list(&self) -> Result<BTreeSet<String>, SaveError> {
        let entries = match fs::read_dir(&self.saved_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(SaveError::io(&self.saved_dir, e)),
        };

        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| SaveError::io(&self.saved_dir, e))?;
            if let Some(name) = entry.file_name().to_str()
                && name.ends_with(STORY_EXTENSION)
                && !name.starts_with('.')
            {
                names.insert(name.to_string());
            }
        }
        Ok(names)
    }

    /// Copy a story file into the saved directory.
    ///
    /// Fails with [`SaveError::AlreadySaved`] if a copy exists, including one
    /// created by a concurrent call.
    pub fn save(&self, filename: &str) -> Result<(), SaveError> {
        validate_filename(filename)?;
        create_private_dir(&self.saved_dir).map_err(|e| SaveError::io(&self.saved_dir, e))?;

        let dest = self.saved_dir.join(filename);
        match fs::symlink_metadata(&dest) {
            Ok(_) => return Err(SaveError::AlreadySaved(filename.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(SaveError::io(&dest, e)),
        }

        let src = self.story_dir.join(filename);
        let data = match fs::read(&src) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SaveError::NotFound(filename.to_string()));
            }
            Err(e) => return Err(SaveError::io(&src, e)),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".save-")
            .suffix(".tmp")
            .tempfile_in(&self.saved_dir)
            .map_err(|e| SaveError::io(&self.saved_dir, e))?;
        tmp.write_all(&data)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| SaveError::io(tmp.path(), e))?;

        match tmp.persist_noclobber(&dest) {
            Ok(_) => {
                info!(file = %filename, "Saved story");
                Ok(())
            }
            Err(_) if dest.exists() => Err(SaveError::AlreadySaved(filename.to_string())),
            Err(e) => Err(SaveError::io(&dest, e.error)),
        }
    }

    /// Remove a saved copy. The original story file is not touched.
    pub fn unsave(&self, filename: &str) -> Result<(), SaveError> {
        validate_filename(filename)?;
        let path = self.saved_dir.join(filename);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(file = %filename, "Unsaved story");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(SaveError::NotFound(filename.to_string()))
            }
            Err(e) => Err(SaveError::io(&path, e)),
        }
    }
}
