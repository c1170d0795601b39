//! Output directory selection per collection group.

use crate::naming::{sanitize_filename, truncate_to_bytes, MAX_COMPONENT_BYTES};
use std::path::{Path, PathBuf};

/// Maps a group name (playlist title, `"<artist> - <album>"`, or empty for
/// a standalone song) onto the directory its songs are written to.
pub trait DestinationResolver: Send + Sync {
    fn directory_for(&self, group_name: &str) -> PathBuf;
}

/// One sub-folder of `root` per named group; unnamed groups go to `root`.
#[derive(Debug, Clone)]
pub struct CollectionFolders {
    root: PathBuf,
}

impl CollectionFolders {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DestinationResolver for CollectionFolders {
    fn directory_for(&self, group_name: &str) -> PathBuf {
        let folder = sanitize_filename(group_name);
        let folder = truncate_to_bytes(&folder, MAX_COMPONENT_BYTES);
        if folder.is_empty() {
            self.root.clone()
        } else {
            self.root.join(folder)
        }
    }
}
