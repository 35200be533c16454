//! Error taxonomy for the `/analyze` endpoint.
//!
//! Every failure in the request pipeline ends up here exactly once and is
//! rendered as the `{"error": <message>}` envelope.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::AnalysisResponse;

/// Result type alias for pipeline stages.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Errors that can end an analysis request.
///
/// Client-input failures carry a fixed message. Everything else carries the
/// text reported by whatever failed, unchanged.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The request has no file part named `file`.
    #[error("No file provided")]
    MissingFile,

    /// The `file` part was sent with an empty filename.
    #[error("No file selected")]
    EmptyFilename,

    /// The multipart body broke off while reading the file part.
    #[error("{0}")]
    Upload(String),

    /// The upload is not a readable numeric array.
    #[error("{0}")]
    Decode(String),

    /// The prediction collaborator failed.
    #[error("{0}")]
    Prediction(String),

    /// The CAM collaborator failed.
    #[error("{0}")]
    Cam(String),

    /// A CAM image could not be compressed.
    #[error("{0}")]
    Encode(String),

    /// The blocking worker running the pipeline went away.
    #[error("{0}")]
    Internal(String),
}

impl AnalysisError {
    /// Short name of the failure category, used in log events.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::MissingFile => "missing_file",
            AnalysisError::EmptyFilename => "empty_filename",
            AnalysisError::Upload(_) => "upload",
            AnalysisError::Decode(_) => "decode",
            AnalysisError::Prediction(_) => "prediction",
            AnalysisError::Cam(_) => "cam",
            AnalysisError::Encode(_) => "encode",
            AnalysisError::Internal(_) => "internal",
        }
    }
}

impl ResponseError for AnalysisError {
    fn status_code(&self) -> StatusCode {
        match self {
            AnalysisError::MissingFile | AnalysisError::EmptyFilename => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(AnalysisResponse::Failure {
            error: self.to_string(),
        })
    }
}
