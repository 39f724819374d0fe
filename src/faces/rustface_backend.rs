//! SeetaFace frontal detector via the pure-Rust `rustface` crate.
//!
//! The model file (`seeta_fd_frontal_v1.0.bin`) must be present in the
//! configured model directory. Loading happens once, in
//! [`RustfaceDetector::load`]; a missing model is a configuration error and
//! stops the run before any photo is touched.
//!
//! Detection runs on the grayscale decode of the raw file. When several faces
//! are found, the highest-scoring box wins.

use super::{DetectError, FaceDetector};
use crate::config::FacesConfig;
use crate::focus::FocusPoint;
use crate::imaging::rust_backend::load_image;
use rustface::{Detector, ImageData};
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of the SeetaFace frontal model inside the model directory.
pub const MODEL_FILE: &str = "seeta_fd_frontal_v1.0.bin";

pub struct RustfaceDetector {
    detector: Box<dyn Detector>,
}

impl RustfaceDetector {
    /// Load the model from `model_dir` and apply detection settings.
    pub fn load(model_dir: &Path, settings: &FacesConfig) -> Result<Self, DetectError> {
        let model_path = model_dir.join(MODEL_FILE);
        if !model_path.is_file() {
            return Err(DetectError::ModelMissing(model_path));
        }
        let path_str = model_path.to_str().ok_or_else(|| DetectError::ModelLoad {
            path: model_path.clone(),
            reason: "model path is not valid UTF-8".into(),
        })?;
        let mut detector =
            rustface::create_detector(path_str).map_err(|e| DetectError::ModelLoad {
                path: model_path.clone(),
                reason: e.to_string(),
            })?;

        detector.set_min_face_size(settings.min_face_size);
        detector.set_score_thresh(settings.score_threshold);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        info!(model = %model_path.display(), "face model loaded");
        Ok(Self { detector })
    }
}

impl FaceDetector for RustfaceDetector {
    fn locate(&mut self, path: &Path) -> Result<Option<FocusPoint>, DetectError> {
        let gray = load_image(path)
            .map_err(|e| DetectError::Decode {
                path: PathBuf::from(path),
                reason: e.to_string(),
            })?
            .to_luma8();
        let (width, height) = gray.dimensions();
        let mut image = ImageData::new(gray.as_raw(), width, height);

        let best = self
            .detector
            .detect(&mut image)
            .into_iter()
            .max_by(|a, b| a.score().total_cmp(&b.score()));

        Ok(best.map(|face| {
            let bbox = face.bbox();
            FocusPoint::from_box_center(
                f64::from(bbox.x()),
                f64::from(bbox.y()),
                f64::from(bbox.width()),
                f64::from(bbox.height()),
                width,
                height,
            )
        }))
    }
}
