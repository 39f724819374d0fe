//! Asset discovery.
//!
//! Walks the asset root and classifies every file by extension:
//!
//! - **raw**: `jpg`, `jpeg`, `png`, `gif`, `bmp`, `tif`, `tiff` (case-insensitive)
//! - **encoded**: the delivery extension, `webp`
//!
//! Anything else (manifests, sidecars, `.DS_Store`) is ignored. The two
//! classes are disjoint by construction: the delivery extension is never in
//! the raw set.
//!
//! [`AssetScan`] holds no results. [`AssetScan::raw`] and
//! [`AssetScan::encoded`] start a fresh walk on every call, so a sequence can
//! be enumerated again after files have been converted or moved. The
//! orchestrator relies on this to re-discover the complete encoded set after
//! conversion.
//!
//! Traversal order is whatever the filesystem yields. Unreadable directory
//! entries are logged and skipped. Symlinks are not followed.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

/// Extension of the delivery format.
pub const ENCODED_EXTENSION: &str = "webp";

/// Extensions treated as raw, not-yet-converted photos.
pub const RAW_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff"];

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Asset root does not exist or is not a directory: {0}")]
    MissingRoot(PathBuf),
}

fn has_extension(path: &Path, candidates: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| candidates.iter().any(|c| ext.eq_ignore_ascii_case(c)))
}

/// True for files the pipeline should convert.
pub fn is_raw(path: &Path) -> bool {
    has_extension(path, RAW_EXTENSIONS) && !is_encoded(path)
}

/// True for files already in the delivery format.
pub fn is_encoded(path: &Path) -> bool {
    has_extension(path, &[ENCODED_EXTENSION])
}

/// A restartable view over the image files below one root directory.
#[derive(Debug, Clone)]
pub struct AssetScan {
    root: PathBuf,
}

impl AssetScan {
    /// Create a scan over `root`. Fails if `root` is not an existing directory.
    pub fn new(root: &Path) -> Result<Self, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::MissingRoot(root.to_path_buf()));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw photos below the root. Each call walks the tree again.
    pub fn raw(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.files().filter(|p| is_raw(p))
    }

    /// Encoded (delivery-format) files below the root. Each call walks the tree again.
    pub fn encoded(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.files().filter(|p| is_encoded(p))
    }

    fn files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(root = %self.root.display(), error = %e, "skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
    }
}
