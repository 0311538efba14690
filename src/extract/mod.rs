//! Story extraction backends.
//!
//! A [`StoryExtractor`] turns one parsed message into an ordered list of
//! stories. The real backend talks to an OpenAI-compatible chat completions
//! API; [`StubExtractor`] returns canned stories for tests and dry runs.

pub mod openai;
pub mod prompt;

pub use openai::OpenAiExtractor;
pub use prompt::{build_prompt, parse_stories_response};

use async_trait::async_trait;

use crate::error::ExtractionError;
use crate::mail::ParsedMessage;
use crate::stories::ExtractedStory;

/// Extraction backend.
///
/// Implementations must fail closed: an error, never a partial list.
#[async_trait]
pub trait StoryExtractor: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Extract stories from one message, in newsletter order.
    async fn extract(&self, message: &ParsedMessage)
    -> Result<Vec<ExtractedStory>, ExtractionError>;
}

/// Returns the same stories for every message.
#[derive(Debug, Clone, Default)]
pub struct StubExtractor {
    stories: Vec<ExtractedStory>,
}

impl StubExtractor {
    pub fn new(stories: Vec<ExtractedStory>) -> Self {
        Self { stories }
    }
}

#[async_trait]
impl StoryExtractor for StubExtractor {
    fn name(&self) -> &str {
        "stub"
    }

    async fn extract(
        &self,
        _message: &ParsedMessage,
    ) -> Result<Vec<ExtractedStory>, ExtractionError> {
        Ok(self.stories.clone())
    }
}
