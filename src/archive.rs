//! Moves processed raw files out of the public tree.
//!
//! A raw file's archive location mirrors its position under the asset root:
//!
//! ```text
//! public/photos/2024/IMG_0001.JPG  →  originals/photos/2024/IMG_0001.JPG
//! ```
//!
//! The original file name is kept; only encoded outputs are slugged.
//! An existing file at the destination is never overwritten.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{path} is not inside asset root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
    #[error("Failed to archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Moved(PathBuf),
    /// The raw file no longer exists; nothing to do.
    AlreadyGone,
    /// Dry run: the file would be moved here.
    Planned(PathBuf),
    /// Something already occupies the destination; the raw file stays put.
    DestinationExists(PathBuf),
}

pub struct OriginalsArchiver<'a> {
    asset_root: &'a Path,
    archive_root: &'a Path,
    dry_run: bool,
}

impl<'a> OriginalsArchiver<'a> {
    pub fn new(asset_root: &'a Path, archive_root: &'a Path, dry_run: bool) -> Self {
        Self {
            asset_root,
            archive_root,
            dry_run,
        }
    }

    /// Archive path for `raw`.
    pub fn destination(&self, raw: &Path) -> Result<PathBuf, ArchiveError> {
        let relative = raw
            .strip_prefix(self.asset_root)
            .map_err(|_| ArchiveError::OutsideRoot {
                path: raw.to_path_buf(),
                root: self.asset_root.to_path_buf(),
            })?;
        Ok(self.archive_root.join(relative))
    }

    /// Move one raw file into the archive.
    pub fn relocate(&self, raw: &Path) -> Result<ArchiveOutcome, ArchiveError> {
        let destination = self.destination(raw)?;
        let io_err = |source: io::Error| ArchiveError::Io {
            path: raw.to_path_buf(),
            source,
        };

        if !raw.try_exists().map_err(io_err)? {
            debug!(path = %raw.display(), "raw file already gone");
            return Ok(ArchiveOutcome::AlreadyGone);
        }
        if destination.try_exists().map_err(io_err)? {
            warn!(
                path = %raw.display(),
                destination = %destination.display(),
                "archive destination occupied, leaving raw file in place"
            );
            return Ok(ArchiveOutcome::DestinationExists(destination));
        }
        if self.dry_run {
            info!(path = %raw.display(), destination = %destination.display(), "dry run: would archive");
            return Ok(ArchiveOutcome::Planned(destination));
        }

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        move_file(raw, &destination).map_err(io_err)?;
        info!(path = %raw.display(), destination = %destination.display(), "archived");
        Ok(ArchiveOutcome::Moved(destination))
    }
}

/// `rename`, falling back to copy + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(from = %from.display(), to = %to.display(), "cross-device move, copying");
            std::fs::copy(from, to)?;
            if let Err(e) = std::fs::remove_file(from) {
                if let Err(cleanup) = std::fs::remove_file(to) {
                    warn!(path = %to.display(), error = %cleanup, "cannot remove copied original");
                }
                return Err(e);
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}
