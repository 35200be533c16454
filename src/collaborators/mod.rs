//! Interfaces to the model inference and CAM rendering collaborators.

mod onnx;

pub use onnx::{load_labels, OnnxCamGenerator, OnnxPredictor};

use std::sync::Arc;

use crate::models::{CamImage, NumericArray, Prediction};

/// Classifies one numeric array.
pub trait Predictor: Send + Sync {
    fn predict(&self, array: &NumericArray) -> anyhow::Result<Prediction>;
}

/// Produces the class activation map frames for one numeric array, in display order.
pub trait CamGenerator: Send + Sync {
    fn generate(&self, array: &NumericArray) -> anyhow::Result<Vec<CamImage>>;
}

/// Shared, read-only application state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<dyn Predictor>,
    pub cam_generator: Arc<dyn CamGenerator>,
    pub jpeg_quality: u8,
}

impl AppState {
    pub fn new(predictor: Arc<dyn Predictor>, cam_generator: Arc<dyn CamGenerator>) -> Self {
        Self {
            predictor,
            cam_generator,
            jpeg_quality: crate::encode::DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }
}
