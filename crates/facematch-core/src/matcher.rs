//! Nearest-neighbor matching of query embeddings against enrolled identities.

use crate::types::{Embedding, Enrollment, FaceMatch};

/// Maximum Euclidean distance (exclusive) accepted as a match.
pub const MATCH_THRESHOLD: f32 = 0.6;

/// Strategy for comparing query embeddings against a gallery of enrollments.
pub trait Matcher {
    /// Best match for a single query, or `None` if nothing clears the threshold.
    fn best_match(&self, query: &Embedding, gallery: &[Enrollment]) -> Option<FaceMatch>;

    /// Match every query in order. Unmatched queries are skipped, not padded.
    fn match_all(&self, queries: &[Embedding], gallery: &[Enrollment]) -> Vec<FaceMatch> {
        queries
            .iter()
            .filter_map(|q| self.best_match(q, gallery))
            .collect()
    }
}

/// Euclidean distance matcher with a fixed acceptance threshold.
///
/// Scans the whole gallery for each query. Entries whose length differs
/// from the query are never compared. When several enrollments sit at the
/// same minimum distance the first one in gallery order wins.
pub struct EuclideanMatcher {
    threshold: f32,
}

impl EuclideanMatcher {
    pub fn new() -> Self {
        Self {
            threshold: MATCH_THRESHOLD,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Matcher for EuclideanMatcher {
    fn best_match(&self, query: &Embedding, gallery: &[Enrollment]) -> Option<FaceMatch> {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in gallery.iter().enumerate() {
            if entry.embedding.dim() != query.dim() {
                tracing::debug!(
                    student_id = %entry.student_id,
                    stored = entry.embedding.dim(),
                    query = query.dim(),
                    "skipping enrollment with mismatched dimension"
                );
                continue;
            }
            let dist = query.euclidean_distance(&entry.embedding);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        let idx = best_idx?;
        let student_id = &gallery[idx].student_id;
        if best_dist >= self.threshold {
            tracing::debug!(
                nearest = %student_id,
                distance = best_dist,
                threshold = self.threshold,
                "no match"
            );
            return None;
        }

        let distance = f64::from(best_dist);
        Some(FaceMatch {
            student_id: student_id.clone(),
            confidence: round3((1.0 - distance).max(0.0)),
            distance: round3(distance),
        })
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
