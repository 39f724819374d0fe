//! Parameter types for image operations.
//!
//! These structs describe *what* to encode, not *how*. They are the interface
//! between [`convert`](super::convert), which decides what to write, and the
//! [`backend`](super::backend), which does the pixel work. That split lets the
//! converter be tested against a recording mock.

use std::path::PathBuf;

/// Quality setting for lossy WebP encoding (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.min(100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// One raw → delivery-format conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub quality: Quality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 0);
        assert_eq!(Quality::new(55).value(), 55);
        assert_eq!(Quality::new(250).value(), 100);
    }

    #[test]
    fn quality_default_is_80() {
        assert_eq!(Quality::default().value(), 80);
    }
}
