//! Story records on disk: naming, the story store and saved copies.

pub mod model;
pub mod naming;
pub mod saved;
pub mod store;

use std::io;
use std::path::Path;

pub use model::{ExtractedStory, StoryRecord};
pub use saved::{SavedStore, validate_filename};
pub use store::{StoryStore, WriteOutcome};

/// Create `path` and any missing parents, owner-only on unix.
pub fn create_private_dir(path: &Path) -> io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}
