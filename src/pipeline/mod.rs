//! Ingestion pipeline.
//!
//! Every message found in the Maildir flows through:
//! 1. `mail::parse_message`: raw bytes to a `ParsedMessage`
//! 2. `StoryStore::exists`: skip messages that already have records
//! 3. `StoryExtractor::extract`: bounded by a per-call timeout
//! 4. `StoryStore::write`: one file per story, never overwriting

pub mod processor;

pub use processor::{DEFAULT_CALL_TIMEOUT, IngestionProcessor, ProcessorConfig, RunSummary};
