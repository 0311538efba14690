//! Email parsing: raw RFC 5322 bytes to a [`ParsedMessage`].
//!
//! The header section is validated line by line first, so input that is not
//! an email at all is rejected instead of being read as a header-less body.
//! MIME decoding (encoded words, transfer encodings, charsets, multipart
//! structure) is delegated to `mail-parser`.
//!
//! Only a malformed header section fails the parse. A bad `Subject`, `From`
//! or `Date` degrades to a fallback value with a warning.

use std::path::Path;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, TimeZone};
use mail_parser::{Message, MessageParser, MimeHeaders, PartType};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::ParseError;
use crate::mail::html::html_to_text;

/// Nesting bound for multipart walks.
const MAX_MULTIPART_DEPTH: usize = 16;

/// Bytes of the SHA-256 digest used in a generated Message-ID.
const FALLBACK_ID_BYTES: usize = 16;

/// A parsed email, reduced to what story extraction needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    /// Decoded subject line.
    pub subject: String,
    /// Sender address, or the raw `From` header when it could not be parsed.
    pub from_email: String,
    /// Sender display name (empty if absent or unparseable).
    pub from_name: String,
    /// `Date` header, or the time of parsing when missing/unparseable.
    pub date: DateTime<FixedOffset>,
    /// `Message-ID` header, or a deterministic generated id.
    pub message_id: String,
    /// Plain-text body.
    pub body: String,
}

/// Read and parse a message file.
pub fn parse_message_file(path: &Path) -> Result<ParsedMessage, ParseError> {
    let raw = std::fs::read(path)?;
    parse_message(&raw)
}

/// Parse raw message bytes.
pub fn parse_message(raw: &[u8]) -> Result<ParsedMessage, ParseError> {
    let headers = RawHeaders::scan(raw)?;
    let message = MessageParser::default()
        .parse(raw)
        .ok_or(ParseError::Mime)?;

    let subject = message
        .subject()
        .map(str::to_string)
        .or_else(|| headers.get("Subject").map(str::to_string))
        .unwrap_or_default()
        .trim()
        .to_string();

    let (from_email, from_name) = parse_sender(&message, &headers);
    let date = parse_date(&message, &headers);

    let message_id = match headers.get("Message-ID").filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => {
            let raw_date = headers.get("Date").unwrap_or_default();
            let generated = fallback_message_id(&subject, &from_email, raw_date);
            warn!(
                generated_id = %generated,
                "Email missing Message-ID header, generated fallback"
            );
            generated
        }
    };

    let body = extract_body(&message, 0);

    Ok(ParsedMessage {
        subject,
        from_email,
        from_name,
        date,
        message_id,
        body,
    })
}

/// Deterministic Message-ID for messages that lack one.
///
/// Hashes the raw `Date` header text, never the parsed date: a missing or
/// unparseable date falls back to the current time, which would give the
/// same bytes a new id on every run.
pub fn fallback_message_id(subject: &str, from_email: &str, raw_date: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject.as_bytes());
    hasher.update(from_email.as_bytes());
    hasher.update(raw_date.as_bytes());
    let digest = hasher.finalize();

    let hex: String = digest[..FALLBACK_ID_BYTES]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("<generated-{hex}@fallback>")
}

// ── Header section ──────────────────────────────────────────────────

/// Unfolded header fields in message order.
#[derive(Debug, Default)]
struct RawHeaders {
    fields: Vec<(String, String)>,
}

impl RawHeaders {
    /// Validate and collect the header section.
    ///
    /// Every line up to the first blank line must be `name: value` or a
    /// folded continuation of the previous field.
    fn scan(raw: &[u8]) -> Result<Self, ParseError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(ParseError::Empty);
        }

        let text = String::from_utf8_lossy(raw);
        let mut fields: Vec<(String, String)> = Vec::new();

        for (idx, line) in text.split('\n').enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                break;
            }

            if line.starts_with(|c: char| c == ' ' || c == '\t') {
                let Some((_, value)) = fields.last_mut() else {
                    return Err(malformed(idx, line));
                };
                value.push(' ');
                value.push_str(line.trim());
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(malformed(idx, line));
            };
            if !is_field_name(name) {
                return Err(malformed(idx, line));
            }
            fields.push((name.to_string(), value.trim().to_string()));
        }

        if fields.is_empty() {
            return Err(ParseError::MissingHeaders);
        }
        Ok(Self { fields })
    }

    /// First value of a header, case-insensitively.
    fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn is_field_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| (33..=126).contains(&b))
}

fn malformed(idx: usize, line: &str) -> ParseError {
    ParseError::MalformedHeader {
        line: idx + 1,
        content: line.chars().take(80).collect(),
    }
}

// ── Field fallbacks ─────────────────────────────────────────────────

/// Sender address and display name. Falls back to the raw header text.
fn parse_sender(message: &Message, headers: &RawHeaders) -> (String, String) {
    let parsed = message.from().and_then(|addr| addr.first()).and_then(|a| {
        let address = a.address().filter(|s| s.contains('@'))?;
        Some((address.to_string(), a.name().unwrap_or_default().trim().to_string()))
    });

    parsed.unwrap_or_else(|| {
        let raw = headers.get("From").unwrap_or_default().to_string();
        if !raw.is_empty() {
            warn!(from_header = %raw, "Failed to parse From header, keeping raw value");
        }
        (raw, String::new())
    })
}

/// Message date with its original offset; now when missing or unparseable.
fn parse_date(message: &Message, headers: &RawHeaders) -> DateTime<FixedOffset> {
    let Some(raw) = headers.get("Date").filter(|d| !d.is_empty()) else {
        warn!("Email missing Date header, using current time");
        return Local::now().fixed_offset();
    };

    if let Ok(date) = DateTime::parse_from_rfc2822(raw) {
        return date;
    }

    match message.date().and_then(convert_date) {
        Some(date) => date,
        None => {
            warn!(date_header = %raw, "Failed to parse email date, using current time");
            Local::now().fixed_offset()
        }
    }
}

/// Convert mail-parser's lenient date (obsolete formats, odd zones).
fn convert_date(d: &mail_parser::DateTime) -> Option<DateTime<FixedOffset>> {
    let offset_secs = i32::from(d.tz_hour) * 3600 + i32::from(d.tz_minute) * 60;
    let offset = if d.tz_before_gmt {
        FixedOffset::west_opt(offset_secs)?
    } else {
        FixedOffset::east_opt(offset_secs)?
    };
    let naive = NaiveDate::from_ymd_opt(i32::from(d.year), u32::from(d.month), u32::from(d.day))?
        .and_hms_opt(u32::from(d.hour), u32::from(d.minute), u32::from(d.second))?;
    offset.from_local_datetime(&naive).single()
}

// ── Body selection ──────────────────────────────────────────────────

/// First usable text parts found in a multipart tree.
#[derive(Debug, Default)]
struct BodyCandidates {
    plain: Option<String>,
    html: Option<String>,
}

impl BodyCandidates {
    fn into_body(self) -> String {
        match (self.plain, self.html) {
            (Some(plain), _) => plain,
            (None, Some(html)) => html_to_text(&html),
            (None, None) => String::new(),
        }
    }
}

/// Plain-text body of a message, by its top-level content type.
fn extract_body(message: &Message, depth: usize) -> String {
    let Some(root) = message.parts.first() else {
        return String::new();
    };

    match &root.body {
        PartType::Multipart(_) => {
            let mut found = BodyCandidates::default();
            collect_text_parts(message, 0, depth, &mut found);
            found.into_body()
        }
        PartType::Text(text) => text.to_string(),
        PartType::Html(html) => html_to_text(html),
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
            String::from_utf8_lossy(bytes).into_owned()
        }
        PartType::Message(inner) if depth < MAX_MULTIPART_DEPTH => extract_body(inner, depth + 1),
        PartType::Message(_) => String::new(),
    }
}

/// Walk a multipart tree, remembering the first non-empty plain and HTML parts.
fn collect_text_parts(message: &Message, part_id: usize, depth: usize, found: &mut BodyCandidates) {
    if depth > MAX_MULTIPART_DEPTH {
        return;
    }
    let Some(part) = message.parts.get(part_id) else {
        return;
    };
    let is_attachment = part
        .content_disposition()
        .is_some_and(|d| d.ctype().eq_ignore_ascii_case("attachment"));

    match &part.body {
        PartType::Multipart(children) => {
            for &child in children {
                collect_text_parts(message, child as usize, depth + 1, found);
            }
        }
        PartType::Text(text) if !is_attachment => {
            if found.plain.is_none() && !text.trim().is_empty() {
                found.plain = Some(text.to_string());
            }
        }
        PartType::Html(html) if !is_attachment => {
            if found.html.is_none() && !html.trim().is_empty() {
                found.html = Some(html.to_string());
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "From: Test User <test@example.com>\r\n\
To: user@example.com\r\n\
Subject: Test Newsletter\r\n\
Date: Mon, 02 Jan 2006 15:04:05 -0700\r\n\
Message-ID: <test123@example.com>\r\n\
\r\n\
This is a test email body.\r\n";

    #[test]
    fn parses_simple_message() {
        let msg = parse_message(SIMPLE.as_bytes()).unwrap();
        assert_eq!(msg.subject, "Test Newsletter");
        assert_eq!(msg.from_email, "test@example.com");
        assert_eq!(msg.from_name, "Test User");
        assert_eq!(msg.message_id, "<test123@example.com>");
        assert_eq!(msg.date.to_rfc3339(), "2006-01-02T15:04:05-07:00");
        assert!(msg.body.contains("This is a test email body."));
    }

    #[test]
    fn multipart_prefers_plain_text() {
        let raw = "From: sender@example.com\n\
Subject: Both\n\
Date: Mon, 02 Jan 2006 15:04:05 +0000\n\
Message-ID: <both@example.com>\n\
MIME-Version: 1.0\n\
Content-Type: multipart/alternative; boundary=\"b1\"\n\
\n\
--b1\n\
Content-Type: text/plain; charset=utf-8\n\
\n\
Hello plain\n\
--b1\n\
Content-Type: text/html; charset=utf-8\n\
\n\
<p>Hello <b>html</b></p>\n\
--b1--\n";
        let msg = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(msg.body.trim(), "Hello plain");
    }

    #[test]
    fn multipart_html_only_is_reduced() {
        let raw = "From: sender@example.com\n\
Subject: Html\n\
Message-ID: <html@example.com>\n\
Content-Type: multipart/alternative; boundary=\"b1\"\n\
\n\
--b1\n\
Content-Type: text/html; charset=utf-8\n\
\n\
<p>Hello <b>html</b></p>\n\
--b1--\n";
        let msg = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(msg.body.trim(), "Hello html");
    }

    #[test]
    fn nested_multipart_is_walked() {
        let raw = "From: sender@example.com\n\
Subject: Nested\n\
Message-ID: <nested@example.com>\n\
Content-Type: multipart/mixed; boundary=\"outer\"\n\
\n\
--outer\n\
Content-Type: multipart/alternative; boundary=\"inner\"\n\
\n\
--inner\n\
Content-Type: text/plain\n\
\n\
Deep plain text\n\
--inner\n\
Content-Type: text/html\n\
\n\
<p>Deep html</p>\n\
--inner--\n\
--outer\n\
Content-Type: text/plain\n\
Content-Disposition: attachment; filename=\"notes.txt\"\n\
\n\
attached notes\n\
--outer--\n";
        let msg = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(msg.body.trim(), "Deep plain text");
    }

    #[test]
    fn top_level_html_is_reduced() {
        let raw = "From: sender@example.com\n\
Subject: Html body\n\
Content-Type: text/html; charset=utf-8\n\
\n\
<h1>Title</h1><p>Paragraph</p>\n";
        let msg = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(msg.body, "Title\n\nParagraph\n\n");
    }

    #[test]
    fn quoted_printable_is_decoded() {
        let raw = "From: sender@example.com\n\
Subject: QP\n\
Content-Type: text/plain; charset=utf-8\n\
Content-Transfer-Encoding: quoted-printable\n\
\n\
Caf=C3=A9 au lait\n";
        let msg = parse_message(raw.as_bytes()).unwrap();
        assert!(msg.body.contains("Café au lait"));
    }

    #[test]
    fn encoded_subject_is_decoded() {
        let raw = "From: test@example.com\n\
Subject: =?UTF-8?Q?Caf=C3=A9_News?=\n\
Date: Mon, 02 Jan 2006 15:04:05 +0000\n\
\n\
body\n";
        let msg = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(msg.subject, "Café News");
    }

    #[test]
    fn unparseable_sender_keeps_raw_header() {
        let raw = "From: not an address\n\
Subject: Odd sender\n\
\n\
body\n";
        let msg = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(msg.from_email, "not an address");
        assert_eq!(msg.from_name, "");
    }

    #[test]
    fn missing_date_uses_current_time() {
        let raw = "From: test@example.com\nSubject: No date\n\nbody\n";
        let before = Local::now().fixed_offset();
        let msg = parse_message(raw.as_bytes()).unwrap();
        assert!(msg.date >= before - chrono::Duration::seconds(1));
    }

    #[test]
    fn garbage_date_uses_current_time() {
        let raw = "From: test@example.com\nDate: sometime last week\n\nbody\n";
        let before = Local::now().fixed_offset();
        let msg = parse_message(raw.as_bytes()).unwrap();
        assert!(msg.date >= before - chrono::Duration::seconds(1));
    }

    #[test]
    fn fallback_message_id_is_deterministic() {
        let raw = "From: test@example.com\n\
Subject: No id\n\
Date: Mon, 02 Jan 2006 15:04:05 +0000\n\
\n\
body\n";
        let first = parse_message(raw.as_bytes()).unwrap();
        let second = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(first.message_id, second.message_id);
        assert!(first.message_id.starts_with("<generated-"));
        assert!(first.message_id.ends_with("@fallback>"));
        let hex = first
            .message_id
            .trim_start_matches("<generated-")
            .trim_end_matches("@fallback>");
        assert_eq!(hex.len(), FALLBACK_ID_BYTES * 2);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fallback_message_id_differs_by_content() {
        let date = "Mon, 02 Jan 2006 15:04:05 +0000";
        assert_ne!(
            fallback_message_id("a", "x@example.com", date),
            fallback_message_id("b", "x@example.com", date)
        );
        assert_ne!(
            fallback_message_id("a", "x@example.com", date),
            fallback_message_id("a", "x@example.com", "")
        );
    }

    #[test]
    fn fallback_message_id_is_stable_without_date() {
        let raw = "From: test@example.com\nSubject: No id, no date\n\nbody\n";
        let first = parse_message(raw.as_bytes()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(first.message_id, second.message_id);
        assert_eq!(
            first.message_id,
            fallback_message_id("No id, no date", "test@example.com", "")
        );
    }

    #[test]
    fn fallback_message_id_is_stable_with_unparseable_date() {
        let raw = "From: test@example.com\nDate: sometime last week\n\nbody\n";
        let first = parse_message(raw.as_bytes()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(first.message_id, second.message_id);
    }

    #[test]
    fn missing_content_type_is_plain_text() {
        let raw = "From: test@example.com\nSubject: Plain\n\n<p>not html</p>\n";
        let msg = parse_message(raw.as_bytes()).unwrap();
        assert!(msg.body.contains("<p>not html</p>"));
    }

    #[test]
    fn folded_headers_are_unfolded() {
        let headers = RawHeaders::scan(b"Subject: part one\r\n  part two\r\n\r\nbody").unwrap();
        assert_eq!(headers.get("subject"), Some("part one part two"));
    }

    #[test]
    fn not_an_email_is_rejected() {
        let err = parse_message(b"This is not a valid email").unwrap_err();
        assert!(matches!(err, ParseError::MalformedHeader { line: 1, .. }));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(parse_message(b"").unwrap_err(), ParseError::Empty));
        assert!(matches!(parse_message(b"\n\n").unwrap_err(), ParseError::Empty));
    }

    #[test]
    fn leading_continuation_line_is_rejected() {
        let err = parse_message(b" folded: first\n\nbody").unwrap_err();
        assert!(matches!(err, ParseError::MalformedHeader { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = parse_message_file(&dir.path().join("missing.eml")).unwrap_err();
        assert!(matches!(err, ParseError::Io(_)));
    }
}
