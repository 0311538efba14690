//! Ingestion processor: Maildir in, story files out.
//!
//! Each message ends in exactly one of three states:
//! 1. processed: stories extracted and persisted (possibly zero of them)
//! 2. skipped: records for this message already exist
//! 3. errored: parse, extraction or persistence failed
//!
//! Per-message failures are counted and the run moves on. Only failing to
//! enumerate the Maildir or a missing story directory aborts the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{ExtractionError, MessageError, PersistenceError, Result};
use crate::extract::StoryExtractor;
use crate::logging::LogOptions;
use crate::mail::{ParsedMessage, parse_message, scan_maildir};
use crate::stories::{StoryRecord, StoryStore};

/// Default bound on a single extraction call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings for one ingestion run.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub maildir: PathBuf,
    pub storydir: PathBuf,
    /// Process at most this many messages, newest first.
    pub limit: Option<usize>,
    pub call_timeout: Duration,
    /// Budget for the whole run. Caps each call's timeout; once spent, no
    /// further messages are started.
    pub run_timeout: Option<Duration>,
    pub log: LogOptions,
}

impl ProcessorConfig {
    pub fn new(maildir: impl Into<PathBuf>, storydir: impl Into<PathBuf>) -> Self {
        Self {
            maildir: maildir.into(),
            storydir: storydir.into(),
            limit: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            run_timeout: None,
            log: LogOptions::default(),
        }
    }
}

/// Aggregate counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    /// The run stopped early on shutdown or run timeout.
    pub cancelled: bool,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.errors == 0 && !self.cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageOutcome {
    Processed { stories: usize },
    Skipped,
}

/// Drives scanner, parser, existence check, extractor and store.
pub struct IngestionProcessor {
    config: ProcessorConfig,
    store: StoryStore,
    extractor: Arc<dyn StoryExtractor>,
}

impl IngestionProcessor {
    pub fn new(config: ProcessorConfig, extractor: Arc<dyn StoryExtractor>) -> Self {
        let store = StoryStore::new(&config.storydir);
        Self {
            config,
            store,
            extractor,
        }
    }

    /// Run to completion (or until the run timeout).
    pub async fn run(&self) -> Result<RunSummary> {
        let (_keep_open, shutdown) = watch::channel(false);
        self.run_with_shutdown(shutdown).await
    }

    /// Run until done or until `shutdown` becomes `true`.
    ///
    /// On shutdown the in-flight message is abandoned and counted as an
    /// error; the counts so far are returned with `cancelled` set.
    pub async fn run_with_shutdown(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary> {
        let mut paths = scan_maildir(&self.config.maildir)?;
        if !self.config.storydir.is_dir() {
            return Err(PersistenceError::MissingDirectory(self.config.storydir.clone()).into());
        }

        info!(
            count = paths.len(),
            maildir = %self.config.maildir.display(),
            extractor = self.extractor.name(),
            "Found messages"
        );
        if let Some(limit) = self.config.limit
            && paths.len() > limit
        {
            paths.truncate(limit);
            info!(limit, "Limiting message processing");
        }

        let deadline = self.config.run_timeout.map(|budget| Instant::now() + budget);
        let mut summary = RunSummary {
            total: paths.len(),
            ..Default::default()
        };

        for (idx, path) in paths.iter().enumerate() {
            if *shutdown.borrow() {
                warn!("Shutdown requested, stopping run");
                summary.cancelled = true;
                break;
            }

            let call_timeout = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        warn!(remaining = paths.len() - idx, "Run timeout reached, stopping run");
                        summary.cancelled = true;
                        break;
                    }
                    remaining.min(self.config.call_timeout)
                }
                None => self.config.call_timeout,
            };

            if self.config.log.verbose {
                info!(
                    index = idx + 1,
                    total = paths.len(),
                    path = %path.display(),
                    "Processing message"
                );
            } else {
                debug!(index = idx + 1, path = %path.display(), "Processing message");
            }

            let result = tokio::select! {
                result = self.process_message(idx, path, call_timeout) => result,
                () = shutdown_requested(&mut shutdown) => {
                    warn!(path = %path.display(), "Shutdown requested, abandoning message");
                    summary.errors += 1;
                    summary.cancelled = true;
                    break;
                }
            };

            match result {
                Ok(MessageOutcome::Processed { stories }) => {
                    debug!(path = %path.display(), stories, "Message processed");
                    summary.processed += 1;
                }
                Ok(MessageOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!(
                        path = %path.display(),
                        stage = e.stage(),
                        error = %e,
                        "Failed to process message"
                    );
                    summary.errors += 1;
                }
            }
        }

        info!(
            total = summary.total,
            processed = summary.processed,
            skipped = summary.skipped,
            errors = summary.errors,
            cancelled = summary.cancelled,
            "Processing complete"
        );
        Ok(summary)
    }

    async fn process_message(
        &self,
        idx: usize,
        path: &Path,
        call_timeout: Duration,
    ) -> std::result::Result<MessageOutcome, MessageError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| MessageError::Parse(e.into()))?;
        let message = parse_message(&raw)?;

        let (message_id, date) = (message.message_id.clone(), message.date);
        match self
            .with_store(move |store| store.exists(&message_id, &date))
            .await
        {
            Ok(true) => {
                debug!(
                    path = %path.display(),
                    message_id = %message.message_id,
                    "Skipping message, stories already exist"
                );
                return Ok(MessageOutcome::Skipped);
            }
            Ok(false) => {}
            // Treat as not yet processed rather than drop the message.
            Err(e) => warn!(
                path = %path.display(),
                error = %e,
                "Failed to check for existing stories"
            ),
        }

        self.log_message(idx, &message);

        let started = Instant::now();
        let extracted = tokio::time::timeout(call_timeout, self.extractor.extract(&message))
            .await
            .map_err(|_| ExtractionError::Timeout(call_timeout))??;
        info!(
            path = %path.display(),
            count = extracted.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Extracted stories"
        );

        let records: Vec<StoryRecord> = extracted
            .into_iter()
            .map(|story| StoryRecord::from_extracted(story, &message))
            .collect();
        if self.config.log.log_stories {
            for (i, story) in records.iter().enumerate() {
                info!(
                    index = i + 1,
                    headline = %story.headline,
                    teaser = %story.teaser,
                    url = %story.url,
                    "Story"
                );
            }
        }

        let count = records.len();
        let (message_id, date) = (message.message_id.clone(), message.date);
        let outcome = self
            .with_store(move |store| store.write(&message_id, &date, &records))
            .await?;
        if outcome.skipped > 0 {
            debug!(
                message_id = %message.message_id,
                written = outcome.written,
                skipped = outcome.skipped,
                "Some stories were already on disk"
            );
        }

        Ok(MessageOutcome::Processed { stories: count })
    }

    /// Run a blocking story directory operation on the blocking pool.
    async fn with_store<T, F>(&self, op: F) -> std::result::Result<T, PersistenceError>
    where
        F: FnOnce(&StoryStore) -> std::result::Result<T, PersistenceError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(&store)).await?
    }

    fn log_message(&self, idx: usize, message: &ParsedMessage) {
        let log = &self.config.log;
        if !log.headers() {
            return;
        }
        let date = message.date.format("%Y-%m-%d %H:%M:%S").to_string();
        if log.log_bodies {
            info!(
                index = idx + 1,
                subject = %message.subject,
                from_email = %message.from_email,
                from_name = %message.from_name,
                date = %date,
                message_id = %message.message_id,
                body_length = message.body.len(),
                body = %message.body,
                "Parsed message"
            );
        } else {
            info!(
                index = idx + 1,
                subject = %message.subject,
                from_email = %message.from_email,
                from_name = %message.from_name,
                date = %date,
                message_id = %message.message_id,
                body_length = message.body.len(),
                "Parsed message"
            );
        }
    }
}

/// Resolves once shutdown is signalled. Never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let signalled = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !signalled {
        std::future::pending::<()>().await;
    }
}
