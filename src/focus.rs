//! Focus points and their manifest keys.
//!
//! Faces are detected on the *raw* file, but the raw file is converted and
//! then archived away, so by the time the manifest is merged the only thing
//! left is the encoded file. [`destination_key`] predicts the manifest key
//! of that future encoded file up front, using the same path rule as
//! [`destination_path`], so a detection result can be attached later no
//! matter which stages ran in between.

use crate::imaging::{ConvertError, destination_path};
use crate::manifest::{KeyError, manifest_key};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Normalized `(x, y)` centroid, each axis in `[0, 1]`, four decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusPoint {
    pub x: f64,
    pub y: f64,
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn unit(v: f64) -> f64 {
    if v.is_nan() { 0.5 } else { round4(v.clamp(0.0, 1.0)) }
}

impl FocusPoint {
    /// Build a point, clamping to `[0, 1]` and rounding to four decimals.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: unit(x),
            y: unit(y),
        }
    }

    /// Center of a pixel box, normalized by the image size.
    pub fn from_box_center(
        left: f64,
        top: f64,
        box_width: f64,
        box_height: f64,
        image_width: u32,
        image_height: u32,
    ) -> Self {
        let cx = left + box_width / 2.0;
        let cy = top + box_height / 2.0;
        Self::new(cx / f64::from(image_width), cy / f64::from(image_height))
    }

    /// Repair a point read from disk: clamp and round.
    pub fn sanitized(self) -> Self {
        Self::new(self.x, self.y)
    }
}

/// Freshly detected focus points, keyed by destination manifest key.
pub type FocusMap = BTreeMap<String, FocusPoint>;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Destination(#[from] ConvertError),
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Manifest key the encoded version of `raw` will have once it exists.
pub fn destination_key(asset_root: &Path, raw: &Path) -> Result<String, ResolveError> {
    let destination = destination_path(raw)?;
    Ok(manifest_key(asset_root, &destination)?)
}
