//! File-backed story store: one JSON file per story.
//!
//! Writes go through a temp file in the destination directory that is
//! linked into place without replacing an existing file, so concurrent
//! writers never observe or leave partial records.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use tracing::{debug, warn};

use crate::error::PersistenceError;
use crate::stories::model::StoryRecord;
use crate::stories::naming::{self, STORY_EXTENSION};

/// How many records a write created versus found already present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub written: usize,
    pub skipped: usize,
}

/// Story records stored as files in one directory.
#[derive(Debug, Clone)]
pub struct StoryStore {
    dir: PathBuf,
}

impl StoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether any record for this message is already on disk.
    ///
    /// A missing directory means nothing has been written yet.
    pub fn exists(
        &self,
        message_id: &str,
        date: &DateTime<FixedOffset>,
    ) -> Result<bool, PersistenceError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(PersistenceError::io(&self.dir, e)),
        };

        let prefix = naming::record_prefix(message_id, date);
        for entry in entries {
            let entry = entry.map_err(|e| PersistenceError::io(&self.dir, e))?;
            if let Some(name) = entry.file_name().to_str()
                && naming::is_record_of(name, &prefix)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Persist one file per story, numbered from 1 in input order.
    ///
    /// Records already on disk are left untouched and counted as skipped,
    /// including ones another writer created while this call was running.
    pub fn write(
        &self,
        message_id: &str,
        date: &DateTime<FixedOffset>,
        stories: &[StoryRecord],
    ) -> Result<WriteOutcome, PersistenceError> {
        let mut outcome = WriteOutcome::default();

        for (idx, story) in stories.iter().enumerate() {
            let filename = naming::story_filename(message_id, date, idx + 1);
            let path = self.dir.join(&filename);

            if path.exists() {
                debug!(file = %filename, "Story already exists, skipping");
                outcome.skipped += 1;
                continue;
            }

            let data = serde_json::to_vec_pretty(story)?;
            if self.write_new(&path, &data)? {
                debug!(file = %filename, "Wrote story");
                outcome.written += 1;
            } else {
                debug!(file = %filename, "Story written concurrently, skipping");
                outcome.skipped += 1;
            }
        }

        Ok(outcome)
    }

    /// Returns `false` if `path` appeared before the temp file could be linked.
    fn write_new(&self, path: &Path, data: &[u8]) -> Result<bool, PersistenceError> {
        // Temp files are created 0600 on unix.
        let mut tmp = tempfile::Builder::new()
            .prefix(".story-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| PersistenceError::io(&self.dir, e))?;
        tmp.write_all(data)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| PersistenceError::io(tmp.path(), e))?;

        match tmp.persist_noclobber(path) {
            Ok(_) => Ok(true),
            Err(_) if path.exists() => Ok(false),
            Err(e) => Err(PersistenceError::io(path, e.error)),
        }
    }

    /// Load every readable record, newest publication date first.
    ///
    /// Files that fail to read or parse are skipped.
    pub fn read_all(&self) -> Result<Vec<StoryRecord>, PersistenceError> {
        if !self.dir.is_dir() {
            return Err(PersistenceError::MissingDirectory(self.dir.clone()));
        }
        let entries = fs::read_dir(&self.dir).map_err(|e| PersistenceError::io(&self.dir, e))?;

        let mut stories = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PersistenceError::io(&self.dir, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !name.ends_with(STORY_EXTENSION) || name.starts_with('.') {
                continue;
            }

            let path = entry.path();
            let data = match fs::read(&path) {
                Ok(data) => data,
                Err(e) => {
                    warn!(file = %name, error = %e, "Failed to read story file");
                    continue;
                }
            };
            match serde_json::from_slice::<StoryRecord>(&data) {
                Ok(mut story) => {
                    story.filename = Some(name);
                    stories.push(story);
                }
                Err(e) => debug!(file = %name, error = %e, "Skipping invalid story file"),
            }
        }

        stories.sort_by(|a, b| {
            b.published
                .cmp(&a.published)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        Ok(stories)
    }
}
