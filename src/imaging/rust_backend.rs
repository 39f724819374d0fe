//! Production codec backend.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::image_dimensions` (header only) |
//! | Decode (JPEG, PNG, GIF, BMP, TIFF) | `image` crate |
//! | Encode → WebP (lossy, quality 0-100) | `webp::Encoder` |
//!
//! The `image` crate's own WebP encoder is lossless-only, so it cannot honor
//! the quality setting; encoding goes through `webp` instead.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::EncodeParams;
use image::{DynamicImage, ImageReader};
use std::path::Path;

pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk.
pub(crate) fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

/// Encode as lossy WebP. `webp` only accepts 8-bit RGB/RGBA buffers.
fn save_webp(img: &DynamicImage, path: &Path, quality: u32) -> Result<(), BackendError> {
    let normalized = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };
    let encoder = webp::Encoder::from_image(&normalized)
        .map_err(|e| BackendError::ProcessingFailed(format!("WebP encoder rejected image: {e}")))?;
    let encoded = encoder.encode(quality as f32);
    std::fs::write(path, &*encoded)?;
    Ok(())
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!(
                "Failed to read dimensions of {}: {}",
                path.display(),
                e
            ))
        })?;
        if width == 0 || height == 0 {
            return Err(BackendError::ProcessingFailed(format!(
                "Zero-sized image header in {}",
                path.display()
            )));
        }
        Ok(Dimensions { width, height })
    }

    fn encode(&self, params: &EncodeParams) -> Result<(), BackendError> {
        let img = load_image(&params.source)?;
        save_webp(&img, &params.output, params.quality.value())
    }
}
