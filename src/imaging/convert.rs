//! Idempotent raw → delivery-format conversion.
//!
//! The destination of a raw file is fixed: same directory, slugged stem,
//! `.webp` extension.
//!
//! ```text
//! photos/2024/My Photo_2024.JPG  →  photos/2024/my-photo-2024.webp
//! ```
//!
//! If the destination already exists the backend is never called and the
//! existing path is returned as-is. A previously derived file may have been
//! retouched by hand, and re-encoding would silently throw that work away.
//!
//! The backend writes into `<name>.webp.tmp` and the result is renamed into
//! place, so an interrupted encode never leaves a file at the destination.
//!
//! In dry-run mode the destination is still computed and returned, but
//! nothing is encoded or written.

use super::backend::{BackendError, ImageBackend};
use super::params::{EncodeParams, Quality};
use crate::naming::normalize_stem;
use crate::scan::ENCODED_EXTENSION;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Filename of {0} normalizes to an empty slug")]
    EmptySlug(PathBuf),
    #[error("Raw file has no parent directory: {0}")]
    NoParent(PathBuf),
    #[error("Encoding {path} failed: {source}")]
    Backend {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
    #[error("Failed to move encoded output into place at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What happened to one raw file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertStatus {
    /// The backend wrote a new file.
    Encoded,
    /// The destination already existed; nothing was touched.
    Skipped,
    /// Dry run: the file would have been encoded.
    Planned,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub source: PathBuf,
    pub output: PathBuf,
    pub status: ConvertStatus,
}

/// Compute where the encoded version of `raw` lives.
pub fn destination_path(raw: &Path) -> Result<PathBuf, ConvertError> {
    let slug = normalize_stem(raw);
    if slug.is_empty() {
        return Err(ConvertError::EmptySlug(raw.to_path_buf()));
    }
    let parent = raw
        .parent()
        .ok_or_else(|| ConvertError::NoParent(raw.to_path_buf()))?;
    Ok(parent.join(format!("{slug}.{ENCODED_EXTENSION}")))
}

/// `photos/a.webp` → `photos/a.webp.tmp`
fn staging_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    output.with_file_name(name)
}

fn discard(staging: &Path) {
    match std::fs::remove_file(staging) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %staging.display(), error = %e, "cannot remove partial output"),
    }
}

/// Converts raw photos through an [`ImageBackend`].
pub struct ImageEncoder<'a, B: ImageBackend + ?Sized> {
    backend: &'a B,
    quality: Quality,
    dry_run: bool,
}

impl<'a, B: ImageBackend + ?Sized> ImageEncoder<'a, B> {
    pub fn new(backend: &'a B, quality: Quality, dry_run: bool) -> Self {
        Self {
            backend,
            quality,
            dry_run,
        }
    }

    /// Convert one raw file. Calling this twice for the same path encodes at most once.
    pub fn convert(&self, raw: &Path) -> Result<Conversion, ConvertError> {
        let output = destination_path(raw)?;

        if output.exists() {
            debug!(source = %raw.display(), output = %output.display(), "already converted");
            return Ok(Conversion {
                source: raw.to_path_buf(),
                output,
                status: ConvertStatus::Skipped,
            });
        }

        if self.dry_run {
            info!(source = %raw.display(), output = %output.display(), "dry run: would encode");
            return Ok(Conversion {
                source: raw.to_path_buf(),
                output,
                status: ConvertStatus::Planned,
            });
        }

        let staging = staging_path(&output);
        let params = EncodeParams {
            source: raw.to_path_buf(),
            output: staging.clone(),
            quality: self.quality,
        };
        if let Err(source) = self.backend.encode(&params) {
            discard(&staging);
            return Err(ConvertError::Backend {
                path: raw.to_path_buf(),
                source,
            });
        }
        if let Err(source) = std::fs::rename(&staging, &output) {
            discard(&staging);
            return Err(ConvertError::Io {
                path: output,
                source,
            });
        }
        info!(
            source = %raw.display(),
            output = %output.display(),
            quality = self.quality.value(),
            "encoded"
        );
        Ok(Conversion {
            source: raw.to_path_buf(),
            output,
            status: ConvertStatus::Encoded,
        })
    }
}
