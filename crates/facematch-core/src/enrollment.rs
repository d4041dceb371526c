use crate::types::{DetectedFace, Embedding};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentError {
    #[error("No face detected in image. Please ensure face is clearly visible.")]
    NoFaceDetected,
    #[error("Multiple faces detected ({0}). Please use image with single face.")]
    MultipleFacesDetected(usize),
}

/// Accept an encoder result for enrollment only if it holds exactly one face.
///
/// Images with several faces are rejected rather than guessing which one
/// belongs to the identity being enrolled.
pub fn validate_for_enrollment(faces: Vec<DetectedFace>) -> Result<Embedding, EnrollmentError> {
    let count = faces.len();
    let mut faces = faces.into_iter();
    match (faces.next(), count) {
        (None, _) => Err(EnrollmentError::NoFaceDetected),
        (Some(face), 1) => Ok(face.embedding),
        (Some(_), n) => Err(EnrollmentError::MultipleFacesDetected(n)),
    }
}
