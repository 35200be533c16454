use actix_multipart::{Multipart, MultipartError};
use actix_web::{web, HttpResponse, ResponseError};
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crate::collaborators::AppState;
use crate::decode::decode_npy;
use crate::encode::encode_cam_images;
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{AnalysisResponse, Prediction};

/// Registers the `/analyze` route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/analyze").route(web::post().to(analyze)));
}

/// The `file` part of an analysis request.
struct Upload {
    filename: String,
    bytes: web::Bytes,
}

/// Everything a successful analysis produced.
pub struct Analysis {
    pub prediction: Prediction,
    pub cam_images: Vec<String>,
}

pub async fn analyze(state: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, AnalysisError> {
    match handle(state, payload).await {
        Ok((filename, analysis)) => {
            info!(
                filename = %filename,
                prediction = %analysis.prediction.label,
                confidence = analysis.prediction.confidence,
                cam_images = analysis.cam_images.len(),
                "analysis complete"
            );
            Ok(HttpResponse::Ok().json(AnalysisResponse::success(analysis.prediction, analysis.cam_images)))
        }
        Err(e) => {
            warn!(kind = e.kind(), status = e.status_code().as_u16(), error = %e, "analysis failed");
            Err(e)
        }
    }
}

async fn handle(state: web::Data<AppState>, payload: Multipart) -> AnalysisResult<(String, Analysis)> {
    let upload = read_upload(payload).await?;
    debug!(filename = %upload.filename, size = upload.bytes.len(), "received upload");

    // Inference is CPU bound; keep it off the event loop.
    let state = state.into_inner();
    let bytes = upload.bytes;
    let analysis = web::block(move || run_pipeline(&state, &bytes))
        .await
        .map_err(|e| AnalysisError::Internal(e.to_string()))??;

    Ok((upload.filename, analysis))
}

/// Finds the first part named `file` that carries a filename and reads it whole.
///
/// A part without a `filename` or `filename*` parameter is an ordinary form
/// field, not a file.
async fn read_upload(mut payload: Multipart) -> AnalysisResult<Upload> {
    while let Some(item) = payload.next().await {
        let mut field = match item {
            Ok(field) => field,
            // Not a multipart body at all, so there is no file in it.
            Err(MultipartError::NoContentType)
            | Err(MultipartError::ParseContentType)
            | Err(MultipartError::Boundary) => return Err(AnalysisError::MissingFile),
            Err(e) => return Err(AnalysisError::Upload(e.to_string())),
        };

        let disposition = field.content_disposition();
        if disposition.get_name() != Some("file") {
            continue;
        }
        let filename = match (disposition.get_filename(), disposition.get_filename_ext()) {
            (Some(name), _) => name.to_string(),
            (None, Some(ext)) => String::from_utf8_lossy(&ext.value).into_owned(),
            (None, None) => continue,
        };
        if filename.is_empty() {
            return Err(AnalysisError::EmptyFilename);
        }

        let mut bytes = web::BytesMut::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| AnalysisError::Upload(e.to_string()))?;
            bytes.extend_from_slice(&data);
        }

        return Ok(Upload {
            filename,
            bytes: bytes.freeze(),
        });
    }

    Err(AnalysisError::MissingFile)
}

/// Decode, predict, render and encode, in that order. The first failure wins.
pub fn run_pipeline(state: &AppState, bytes: &[u8]) -> AnalysisResult<Analysis> {
    let array = decode_npy(bytes)?;
    debug!(shape = ?array.shape(), "decoded array");

    let prediction = state
        .predictor
        .predict(&array)
        .map_err(|e| AnalysisError::Prediction(e.to_string()))?;

    let frames = state
        .cam_generator
        .generate(&array)
        .map_err(|e| AnalysisError::Cam(e.to_string()))?;

    let cam_images = encode_cam_images(&frames, state.jpeg_quality)?;

    Ok(Analysis {
        prediction,
        cam_images,
    })
}
