//! Deterministic story filenames: `{YYYY-MM-DD}_{sanitized-message-id}_{ordinal}.json`.
//!
//! Re-running extraction for the same message yields the same names, which
//! is what makes incremental runs idempotent.

use chrono::{DateTime, FixedOffset};

/// Characters that are unsafe in filenames on common filesystems.
const UNSAFE_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Extension of story record files.
pub const STORY_EXTENSION: &str = ".json";

/// Strip enclosing angle brackets and replace unsafe characters with `_`.
pub fn sanitize_message_id(message_id: &str) -> String {
    let trimmed = message_id.strip_prefix('<').unwrap_or(message_id);
    let trimmed = trimmed.strip_suffix('>').unwrap_or(trimmed);
    trimmed
        .chars()
        .map(|c| if UNSAFE_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Date component of a story filename, in the message's own offset.
pub fn date_prefix(date: &DateTime<FixedOffset>) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Common prefix of every story file produced from one message.
pub fn record_prefix(message_id: &str, date: &DateTime<FixedOffset>) -> String {
    format!("{}_{}_", date_prefix(date), sanitize_message_id(message_id))
}

/// Filename of the story at 1-based `ordinal` within its message.
pub fn story_filename(message_id: &str, date: &DateTime<FixedOffset>, ordinal: usize) -> String {
    format!("{}{ordinal}{STORY_EXTENSION}", record_prefix(message_id, date))
}

/// Whether `filename` is a story file with the given record prefix.
///
/// The part between prefix and extension must be an ordinal, so the id
/// `abc` does not claim files belonging to `abc_1`.
pub fn is_record_of(filename: &str, prefix: &str) -> bool {
    filename
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(STORY_EXTENSION))
        .is_some_and(|ordinal| !ordinal.is_empty() && ordinal.bytes().all(|b| b.is_ascii_digit()))
}
