//! Maildir scanning: finds message files under any `cur`/`new` directory.
//!
//! Nested sub-mailboxes (`.Newsletters/cur`, `Archive/2024/new`, ...) are
//! found at any depth. Everything below a directory named `tmp` is skipped,
//! since delivery agents write half-finished messages there.

use std::cmp::Ordering;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::ScanError;

/// Directories whose files are complete, delivered messages.
const MESSAGE_DIRS: &[&str] = &["cur", "new"];

/// Directory holding in-flight deliveries.
const TMP_DIR: &str = "tmp";

/// Collect message file paths below `root`, newest first.
///
/// Maildir filenames start with a zero-padded delivery timestamp, so a
/// descending sort on the file name puts the newest message first.
pub fn scan_maildir(root: &Path) -> Result<Vec<PathBuf>, ScanError> {
    if !root.exists() {
        return Err(ScanError::MissingRoot(root.to_path_buf()));
    }

    let mut messages = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_tmp_dir(entry));

    for entry in walker {
        let entry = entry.map_err(|source| ScanError::Walk {
            path: root.to_path_buf(),
            source,
        })?;

        if entry.file_type().is_file() && in_message_dir(entry.path()) {
            messages.push(entry.into_path());
        }
    }

    messages.sort_by(|a, b| newest_first(a, b));
    debug!(root = %root.display(), count = messages.len(), "Scanned maildir");
    Ok(messages)
}

fn is_tmp_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name() == OsStr::new(TMP_DIR)
}

fn in_message_dir(path: &Path) -> bool {
    path.parent()
        .and_then(Path::file_name)
        .and_then(OsStr::to_str)
        .is_some_and(|dir| MESSAGE_DIRS.contains(&dir))
}

fn newest_first(a: &Path, b: &Path) -> Ordering {
    b.file_name()
        .cmp(&a.file_name())
        .then_with(|| b.cmp(a))
}
