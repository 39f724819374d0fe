//! Shared test utilities for the photo-ingest test suite.
//!
//! Fixture builders for asset trees: empty placeholder files for discovery
//! and lifecycle tests, real decodable images for codec tests.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let raw = touch(tmp.path(), "photos/2024/IMG_0001.JPG");
//! write_test_jpeg(&tmp.path().join("hero.jpg"), 64, 48);
//! let when = utc("2025-01-01T00:00:00Z");
//! ```

use chrono::{DateTime, Utc};
use image::{ImageEncoder, RgbImage};
use std::path::{Path, PathBuf};

// =========================================================================
// File fixtures
// =========================================================================

/// Create an empty file at `root/rel`, including parent directories.
pub fn touch(root: &Path, rel: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, b"").unwrap();
    path
}

/// Write a small valid JPEG with a gradient pattern.
pub fn write_test_jpeg(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let img = gradient(width, height);
    let writer = std::io::BufWriter::new(std::fs::File::create(path).unwrap());
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

/// Write a small valid PNG with a gradient pattern.
pub fn write_test_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let img = gradient(width, height);
    let writer = std::io::BufWriter::new(std::fs::File::create(path).unwrap());
    image::codecs::png::PngEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

// =========================================================================
// Time
// =========================================================================

/// Parse an RFC 3339 timestamp. Panics on malformed input.
pub fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .unwrap_or_else(|e| panic!("bad test timestamp '{s}': {e}"))
        .with_timezone(&Utc)
}
