//! JPEG + base64 encoding of rendered CAM frames.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;

use crate::error::{AnalysisError, AnalysisResult};
use crate::models::CamImage;

/// Quality used when nothing else is configured.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// Compress one frame as JPEG.
pub fn encode_jpeg(image: &CamImage, quality: u8) -> AnalysisResult<Vec<u8>> {
    let mut buffered = Vec::new();
    JpegEncoder::new_with_quality(&mut buffered, quality)
        .encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
        .map_err(|e| AnalysisError::Encode(e.to_string()))?;
    Ok(buffered)
}

/// Encode every frame, in order. The first failure aborts the whole batch.
pub fn encode_cam_images(images: &[CamImage], quality: u8) -> AnalysisResult<Vec<String>> {
    images
        .iter()
        .map(|img| encode_jpeg(img, quality).map(|jpeg| STANDARD.encode(jpeg)))
        .collect()
}
