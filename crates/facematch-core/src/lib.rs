//! facematch-core — Face embedding matching engine.
//!
//! Holds the embedding types, the Euclidean nearest-neighbor matcher, the
//! single-face enrollment rule and the face encoder seam. Detection and
//! embedding extraction are delegated to an ONNX model behind [`FaceEncoder`].

pub mod encoder;
pub mod enrollment;
pub mod matcher;
pub mod types;

pub use encoder::{EncodeError, FaceEncoder, OnnxFaceEncoder};
pub use enrollment::{validate_for_enrollment, EnrollmentError};
pub use matcher::{EuclideanMatcher, Matcher, MATCH_THRESHOLD};
pub use types::{
    normalize_student_id, BoundingBox, DetectedFace, Embedding, Enrollment, FaceMatch,
    EMBEDDING_DIM,
};

use std::path::PathBuf;

/// Default directory searched for the encoder model.
pub fn default_model_dir() -> PathBuf {
    std::env::var("FACEMATCH_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/usr/share/facematch/models"))
}

/// Default location of the enrollment snapshot file.
pub fn default_store_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch")
        .join("encodings.json")
}
