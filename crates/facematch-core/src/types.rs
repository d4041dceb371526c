use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Embedding length produced by the face encoder.
pub const EMBEDDING_DIM: usize = 128;

/// Bounding box for a detected face, in source image pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Face embedding vector (128-dimensional for the bundled encoder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One face returned by the encoder: its region and its embedding.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// A stored identity with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub student_id: String,
    pub embedding: Embedding,
    pub enrolled_at: DateTime<Utc>,
}

/// Result of matching one query embedding against the enrolled set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    pub student_id: String,
    /// `max(0, 1 - distance)`, rounded to 3 decimals.
    pub confidence: f64,
    /// Euclidean distance to the nearest enrollment, rounded to 3 decimals.
    pub distance: f64,
}

/// Canonical form of an identity key: trimmed and upper-cased.
///
/// Returns `None` when nothing is left after trimming.
pub fn normalize_student_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}
