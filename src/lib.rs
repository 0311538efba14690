//! Newsletter stories: extract linked stories from newsletter emails in a
//! Maildir into one JSON file per story.

pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod mail;
pub mod pipeline;
pub mod server;
pub mod stories;
pub mod version;

pub use error::{Error, Result};
