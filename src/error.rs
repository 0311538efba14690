//! Error types for the newsletter story pipeline.

use std::path::PathBuf;
use std::time::Duration;

/// Errors that abort a run or fail a request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Save error: {0}")]
    Save(#[from] SaveError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Missing required setting: {0}")]
    MissingValue(String),

    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Mailbox enumeration errors. These abort a whole run.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Mail directory does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("Failed to walk mail directory {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// A message could not be read as an email. Terminal for that message.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Empty message")]
    Empty,

    #[error("Malformed header line {line}: {content:?}")]
    MalformedHeader { line: usize, content: String },

    #[error("Message has no header section")]
    MissingHeaders,

    #[error("MIME structure could not be parsed")]
    Mime,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The extraction backend failed or returned something unusable.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),
}

/// Story directory I/O failures that are not benign races.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Story directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("Failed to serialize story: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Story directory task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Saved-story errors, distinguished so callers can map them to
/// bad-request / conflict / not-found responses.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Story is already saved: {0}")]
    AlreadySaved(String),

    #[error("Story not found: {0}")]
    NotFound(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SaveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a single message ended in the error state. Never aborts a run.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl MessageError {
    /// Short stage label for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::Extraction(_) => "extract",
            Self::Persistence(_) => "persist",
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
