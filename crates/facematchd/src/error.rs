//! Error types and HTTP error responses for the daemon.

use crate::engine::EngineError;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use facematch_core::EnrollmentError;
use facematch_store::StoreError;
use serde::Serialize;
use thiserror::Error;

/// Request-level error, rendered as `{"error": ..., "kind": ...}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0} required")]
    MissingField(&'static str),
    #[error("{message}")]
    BadMultipart { status: StatusCode, message: String },
    #[error("No face detected in image. Please ensure face is clearly visible.")]
    NoFaceDetected,
    #[error("Multiple faces detected ({0}). Please use image with single face.")]
    MultipleFacesDetected(usize),
    #[error("Failed to save encoding")]
    PersistFailure(#[source] StoreError),
    #[error("Student not found")]
    NotFound(String),
    #[error("{0}")]
    UpstreamEncodeFailure(#[source] EngineError),
    #[error("encoder returned an unusable embedding: {0}")]
    InvalidEmbedding(#[source] StoreError),
}

/// JSON body returned on error.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::MissingField(_) => "missing_field",
            ApiError::BadMultipart { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE => {
                "payload_too_large"
            }
            ApiError::BadMultipart { .. } => "bad_request",
            ApiError::NoFaceDetected => "no_face_detected",
            ApiError::MultipleFacesDetected(_) => "multiple_faces_detected",
            ApiError::PersistFailure(_) => "persist_failure",
            ApiError::NotFound(_) => "not_found",
            ApiError::UpstreamEncodeFailure(_) | ApiError::InvalidEmbedding(_) => {
                "upstream_encode_failure"
            }
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadMultipart { status, .. } => *status,
            ApiError::MissingField(_)
            | ApiError::NoFaceDetected
            | ApiError::MultipleFacesDetected(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UpstreamEncodeFailure(EngineError::Encode(e)) if e.is_bad_input() => {
                StatusCode::BAD_REQUEST
            }
            ApiError::UpstreamEncodeFailure(_)
            | ApiError::InvalidEmbedding(_)
            | ApiError::PersistFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::PersistFailure(e) => tracing::error!(error = %e, "persist failed"),
            ApiError::InvalidEmbedding(e) => tracing::error!(error = %e, "encoder output rejected"),
            ApiError::NotFound(id) => tracing::info!(student_id = %id, "student not found"),
            ApiError::UpstreamEncodeFailure(e) if status.is_server_error() => {
                tracing::error!(error = %e, "encoder failed")
            }
            _ => tracing::warn!(kind = self.kind(), error = %self, "request rejected"),
        }

        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<EnrollmentError> for ApiError {
    fn from(e: EnrollmentError) -> Self {
        match e {
            EnrollmentError::NoFaceDetected => ApiError::NoFaceDetected,
            EnrollmentError::MultipleFacesDetected(n) => ApiError::MultipleFacesDetected(n),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::UpstreamEncodeFailure(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadMultipart {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::EmptyKey => ApiError::MissingField("student_id"),
            StoreError::DimensionMismatch { .. } => ApiError::InvalidEmbedding(e),
            StoreError::Persist { .. } | StoreError::Serialize(_) => ApiError::PersistFailure(e),
        }
    }
}
