use std::path::PathBuf;

use clap::Parser;

use crate::encode::DEFAULT_JPEG_QUALITY;

/// Serves `POST /analyze`: classify an uploaded `.npy` array and render its class activation maps.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address to bind to
    #[arg(long, env = "ANALYSIS_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "ANALYSIS_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Classifier ONNX model
    #[arg(long, env = "ANALYSIS_MODEL")]
    pub model: PathBuf,

    /// ONNX model producing class activation maps
    #[arg(long, env = "ANALYSIS_CAM_MODEL")]
    pub cam_model: PathBuf,

    /// JSON array of labels, indexed by class
    #[arg(long, env = "ANALYSIS_LABELS")]
    pub labels: Option<PathBuf>,

    /// JPEG quality for CAM images (1-100)
    #[arg(
        long,
        env = "ANALYSIS_JPEG_QUALITY",
        default_value_t = DEFAULT_JPEG_QUALITY,
        value_parser = clap::value_parser!(u8).range(1..=100)
    )]
    pub jpeg_quality: u8,
}
