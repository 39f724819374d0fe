//! Face-aware focus detection.
//!
//! A [`FaceDetector`] is a capability object: it owns one loaded model,
//! is constructed once per run, and is handed to the pipeline by reference.
//! Nothing about the model lives in global state.
//!
//! [`detect`] is the only way the pipeline calls a detector. It turns every
//! failure mode (undecodable file, inference error, even a panic inside the
//! model) into [`Detection::Failed`], so a bad photo costs one focus point and
//! never the run. Failures still count against the pipeline's safety gate.

pub mod rustface_backend;

use crate::focus::FocusPoint;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub use rustface_backend::{MODEL_FILE, RustfaceDetector};

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Face model not found at {0}")]
    ModelMissing(PathBuf),
    #[error("Failed to load face model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("Inference failed on {path}: {reason}")]
    Inference { path: PathBuf, reason: String },
}

pub trait FaceDetector {
    /// Find the most prominent face and return its normalized center.
    ///
    /// `Ok(None)` means the model ran and found nothing.
    fn locate(&mut self, path: &Path) -> Result<Option<FocusPoint>, DetectError>;
}

/// Outcome of running detection on one raw file.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Found(FocusPoint),
    NoFace,
    /// Decode or inference failed; treated as "no focus".
    Failed(String),
    /// Detection is switched off in the configuration.
    Disabled,
}

impl Detection {
    pub fn focus(&self) -> Option<FocusPoint> {
        match self {
            Detection::Found(point) => Some(*point),
            _ => None,
        }
    }

    /// Whether the model ran to completion, face or not.
    pub fn completed(&self) -> bool {
        matches!(self, Detection::Found(_) | Detection::NoFace)
    }
}

/// Run `detector` on `path`, absorbing every failure.
pub fn detect(detector: &mut dyn FaceDetector, path: &Path) -> Detection {
    let result = catch_unwind(AssertUnwindSafe(|| detector.locate(path)));
    match result {
        Ok(Ok(Some(point))) => {
            debug!(path = %path.display(), x = point.x, y = point.y, "face found");
            Detection::Found(point)
        }
        Ok(Ok(None)) => {
            debug!(path = %path.display(), "no face");
            Detection::NoFace
        }
        Ok(Err(e)) => {
            warn!(path = %path.display(), error = %e, "face detection failed");
            Detection::Failed(e.to_string())
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "detector panicked".to_string());
            warn!(path = %path.display(), reason = %reason, "face detector panicked");
            Detection::Failed(reason)
        }
    }
}
