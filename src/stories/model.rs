//! Story types.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::mail::ParsedMessage;

/// A story as returned by the extraction backend, before provenance is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedStory {
    pub headline: String,
    #[serde(default)]
    pub teaser: String,
    pub url: String,
}

impl ExtractedStory {
    pub fn new(
        headline: impl Into<String>,
        teaser: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            headline: headline.into(),
            teaser: teaser.into(),
            url: url.into(),
        }
    }
}

/// The durable unit: one story, one JSON file.
///
/// `filename` is never written to disk. It is filled in from the path when
/// records are read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryRecord {
    pub headline: String,
    pub teaser: String,
    pub url: String,
    pub from_email: String,
    pub from_name: String,
    /// Publication date of the newsletter (RFC 3339 on disk).
    #[serde(rename = "date")]
    pub published: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl StoryRecord {
    /// Attach the source message's provenance to an extracted story.
    pub fn from_extracted(story: ExtractedStory, message: &ParsedMessage) -> Self {
        Self {
            headline: story.headline,
            teaser: story.teaser,
            url: story.url,
            from_email: message.from_email.clone(),
            from_name: message.from_name.clone(),
            published: message.date,
            filename: None,
        }
    }
}
