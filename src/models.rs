use image::RgbImage;
use ndarray::ArrayD;
use serde::Serialize;
use serde_json::Value;

/// Numeric array decoded from an upload. Collaborators only ever borrow it.
pub type NumericArray = ArrayD<f32>;

/// One rendered CAM frame, height x width x RGB.
pub type CamImage = RgbImage;

/// What the prediction collaborator reports for one array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Category identifier, passed through to JSON as-is.
    pub label: Value,
    pub confidence: f64,
}

impl Prediction {
    pub fn new(label: impl Into<Value>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Body of every `/analyze` response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AnalysisResponse {
    Success {
        prediction: Value,
        confidence: f64,
        #[serde(rename = "camImages")]
        cam_images: Vec<String>,
    },
    Failure {
        error: String,
    },
}

impl AnalysisResponse {
    pub fn success(prediction: Prediction, cam_images: Vec<String>) -> Self {
        AnalysisResponse::Success {
            prediction: prediction.label,
            confidence: prediction.confidence,
            cam_images,
        }
    }
}
