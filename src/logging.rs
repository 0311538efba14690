//! Tracing setup and per-run diagnostic switches.

use tracing_subscriber::EnvFilter;

/// Diagnostic output for an ingestion run. Passed explicitly to the
/// processor rather than kept in global state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub verbose: bool,
    /// Log parsed header fields for every message.
    pub log_headers: bool,
    /// Log message bodies as sent for extraction. Implies `log_headers`.
    pub log_bodies: bool,
    /// Log every extracted story.
    pub log_stories: bool,
}

impl LogOptions {
    pub fn headers(&self) -> bool {
        self.log_headers || self.log_bodies
    }
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Install the global fmt subscriber on stderr. `RUST_LOG` takes precedence.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
