//! Image codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the whole surface the pipeline needs from a
//! codec: read dimensions from a file header, and encode one raw file into the
//! delivery format. The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::EncodeParams;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Pixel dimensions read from an image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

pub trait ImageBackend {
    /// Read dimensions from the file header. Must not require a full decode.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode `params.source` and write it to `params.output` in the delivery format.
    fn encode(&self, params: &EncodeParams) -> Result<(), BackendError>;
}
