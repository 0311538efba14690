//! Mail input: Maildir scanning and message parsing.

pub mod html;
pub mod maildir;
pub mod parser;

pub use html::html_to_text;
pub use maildir::scan_maildir;
pub use parser::{ParsedMessage, parse_message, parse_message_file};
