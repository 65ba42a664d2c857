use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::guide::MediaLibrary;
use crate::models::MediaItem;

/// Recorded movies per destination directory, listed at most once per scan
#[derive(Debug, Default)]
pub struct MovieIndex {
    directories: HashMap<PathBuf, Vec<MediaItem>>,
}

impl MovieIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Movies in `directory`, listing it through `library` on first use.
    /// A directory that can't be listed is remembered as empty.
    pub fn movies(&mut self, directory: &Path, library: &dyn MediaLibrary) -> &[MediaItem] {
        self.directories
            .entry(directory.to_path_buf())
            .or_insert_with(|| match library.enumerate_directory(directory) {
                Some(items) => {
                    debug!("Indexed {} movies in {}", items.len(), directory.display());
                    items
                }
                None => {
                    warn!("Listing of movies in {} failed", directory.display());
                    Vec::new()
                }
            })
    }

    pub fn is_cached(&self, directory: &Path) -> bool {
        self.directories.contains_key(directory)
    }
}
