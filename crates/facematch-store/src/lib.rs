//! facematch-store — Enrollment table backed by a single JSON snapshot file.
//!
//! The whole table lives in memory and is rewritten to disk after every
//! mutation. Writes go to a sibling temp file first and are renamed into
//! place, so a failed write leaves the previous snapshot intact.

use chrono::Utc;
use facematch_core::{normalize_student_id, Embedding, Enrollment, EMBEDDING_DIM};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("student_id must not be empty")]
    EmptyKey,
    #[error("expected {expected}-dim embedding, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("failed to write snapshot {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Identity to embedding table.
///
/// Keys are normalized with [`normalize_student_id`] on every call, so
/// `"s1"` and `"S1"` address the same entry. Entries keep insertion order;
/// overwriting a key keeps its original position.
pub trait FaceStore: Send {
    /// Insert or overwrite the embedding for `student_id` and persist.
    ///
    /// Embeddings must be [`EMBEDDING_DIM`] long. Returns the normalized key.
    /// On a persist error the in-memory table still holds the new value.
    fn put(&mut self, student_id: &str, embedding: Embedding) -> Result<String, StoreError>;

    /// Delete `student_id` if present and persist. Returns whether it existed.
    fn remove(&mut self, student_id: &str) -> Result<bool, StoreError>;

    /// All enrollments in insertion order.
    fn entries(&self) -> &[Enrollment];

    fn all_keys(&self) -> Vec<String> {
        self.entries().iter().map(|e| e.student_id.clone()).collect()
    }

    fn get(&self, student_id: &str) -> Option<&Enrollment> {
        let key = normalize_student_id(student_id)?;
        self.entries().iter().find(|e| e.student_id == key)
    }

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// [`FaceStore`] persisted as a JSON array of enrollments.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    entries: Vec<Enrollment>,
}

impl SnapshotStore {
    /// Load the snapshot at `path`.
    ///
    /// A missing, unreadable or corrupt snapshot yields an empty store; the
    /// problem is logged and the next successful write replaces the file.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut store = Self {
            path,
            entries: Vec::new(),
        };

        let bytes = match std::fs::read(&store.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %store.path.display(), "no snapshot found; starting empty");
                return store;
            }
            Err(e) => {
                tracing::warn!(path = %store.path.display(), error = %e, "snapshot unreadable; starting empty");
                return store;
            }
        };

        match serde_json::from_slice::<Vec<Enrollment>>(&bytes) {
            Ok(loaded) => {
                for entry in loaded {
                    let Some(key) = normalize_student_id(&entry.student_id) else {
                        tracing::warn!("skipping snapshot entry with empty student_id");
                        continue;
                    };
                    if entry.embedding.dim() != EMBEDDING_DIM {
                        tracing::warn!(
                            student_id = %key,
                            dim = entry.embedding.dim(),
                            expected = EMBEDDING_DIM,
                            "skipping snapshot entry with wrong embedding length"
                        );
                        continue;
                    }
                    store.upsert(Enrollment { student_id: key, ..entry });
                }
                tracing::info!(
                    path = %store.path.display(),
                    count = store.entries.len(),
                    "snapshot loaded"
                );
            }
            Err(e) => {
                tracing::warn!(path = %store.path.display(), error = %e, "snapshot corrupt; starting empty");
            }
        }

        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn upsert(&mut self, enrollment: Enrollment) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.student_id == enrollment.student_id)
        {
            Some(existing) => *existing = enrollment,
            None => self.entries.push(enrollment),
        }
    }

    /// Rewrite the whole snapshot: temp file, then rename over the old one.
    fn persist(&self) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&self.entries)?;
        let persist_err = |source| StoreError::Persist {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(persist_err)?;
        }

        let tmp = tmp_path(&self.path);
        std::fs::write(&tmp, &bytes).map_err(persist_err)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(persist_err(e));
        }

        tracing::debug!(path = %self.path.display(), count = self.entries.len(), "snapshot written");
        Ok(())
    }
}

impl FaceStore for SnapshotStore {
    fn put(&mut self, student_id: &str, embedding: Embedding) -> Result<String, StoreError> {
        let key = normalize_student_id(student_id).ok_or(StoreError::EmptyKey)?;
        if embedding.dim() != EMBEDDING_DIM {
            return Err(StoreError::DimensionMismatch {
                expected: EMBEDDING_DIM,
                actual: embedding.dim(),
            });
        }
        self.upsert(Enrollment {
            student_id: key.clone(),
            embedding,
            enrolled_at: Utc::now(),
        });
        self.persist()?;
        Ok(key)
    }

    fn remove(&mut self, student_id: &str) -> Result<bool, StoreError> {
        let Some(key) = normalize_student_id(student_id) else {
            return Ok(false);
        };
        let before = self.entries.len();
        self.entries.retain(|e| e.student_id != key);
        if self.entries.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    fn entries(&self) -> &[Enrollment] {
        &self.entries
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn emb(v: f32) -> Embedding {
        Embedding::new(vec![v; EMBEDDING_DIM])
    }

    fn temp_store() -> (TempDir, SnapshotStore) {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::load(dir.path().join("encodings.json"));
        (dir, store)
    }

    #[test]
    fn test_load_missing_is_empty() {
        let (_dir, store) = temp_store();
        assert!(store.is_empty());
        assert!(store.all_keys().is_empty());
    }

    #[test]
    fn test_load_corrupt_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("encodings.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = SnapshotStore::load(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_normalizes_key() {
        let (_dir, mut store) = temp_store();
        let key = store.put(" s100 ", emb(0.1)).unwrap();
        assert_eq!(key, "S100");
        assert_eq!(store.all_keys(), vec!["S100"]);
        assert!(store.get("s100").is_some());
    }

    #[test]
    fn test_put_empty_key_rejected() {
        let (_dir, mut store) = temp_store();
        assert!(matches!(store.put("  ", emb(0.1)), Err(StoreError::EmptyKey)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_wrong_dimension_rejected() {
        let (_dir, mut store) = temp_store();
        let err = store.put("s1", Embedding::new(vec![0.1, 0.2])).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { actual: 2, .. }));
        assert!(matches!(
            store.put("s1", Embedding::new(Vec::new())),
            Err(StoreError::DimensionMismatch { actual: 0, .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_overwrite_keeps_single_entry_and_position() {
        let (_dir, mut store) = temp_store();
        store.put("a", emb(0.1)).unwrap();
        store.put("b", emb(0.2)).unwrap();
        store.put("A", emb(0.9)).unwrap();
        assert_eq!(store.all_keys(), vec!["A", "B"]);
        assert_eq!(store.get("a").unwrap().embedding, emb(0.9));
    }

    #[test]
    fn test_reload_round_trip() {
        let (dir, mut store) = temp_store();
        let v = Embedding::new((0..128).map(|i| i as f32 * 0.01 - 0.5).collect());
        store.put("s1", v.clone()).unwrap();
        store.put("s2", emb(0.3)).unwrap();

        let reloaded = SnapshotStore::load(dir.path().join("encodings.json"));
        assert_eq!(reloaded.all_keys(), vec!["S1", "S2"]);
        let stored = &reloaded.get("S1").unwrap().embedding;
        assert_eq!(stored.dim(), 128);
        for (a, b) in stored.values.iter().zip(v.values.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_remove_present_and_absent() {
        let (dir, mut store) = temp_store();
        store.put("s1", emb(0.1)).unwrap();
        store.put("s2", emb(0.2)).unwrap();

        assert!(store.remove("S1").unwrap());
        assert!(!store.remove("s1").unwrap());
        assert!(!store.remove("nobody").unwrap());
        assert_eq!(store.all_keys(), vec!["S2"]);

        let reloaded = SnapshotStore::load(dir.path().join("encodings.json"));
        assert_eq!(reloaded.all_keys(), vec!["S2"]);
    }

    #[test]
    fn test_remove_persist_failure_keeps_removal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("encodings.json");
        let mut store = SnapshotStore::load(&path);
        store.put("s1", emb(0.1)).unwrap();
        store.put("s2", emb(0.2)).unwrap();

        std::fs::create_dir(tmp_path(&path)).unwrap();
        let err = store.remove("s1").unwrap_err();
        assert!(matches!(err, StoreError::Persist { .. }));
        assert_eq!(store.all_keys(), vec!["S2"]);
        assert!(store.get("s1").is_none());

        // Disk still holds the last good snapshot.
        let reloaded = SnapshotStore::load(&path);
        assert_eq!(reloaded.all_keys(), vec!["S1", "S2"]);
    }

    #[test]
    fn test_persist_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/encodings.json");
        let mut store = SnapshotStore::load(&path);
        store.put("s1", emb(0.1)).unwrap();
        assert!(path.exists());
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_persist_failure_keeps_memory_mutation() {
        let dir = TempDir::new().unwrap();
        // A directory where the snapshot file should be makes the rename fail.
        let path = dir.path().join("encodings.json");
        std::fs::create_dir(&path).unwrap();

        let mut store = SnapshotStore::load(&path);
        let err = store.put("s1", emb(0.1)).unwrap_err();
        assert!(matches!(err, StoreError::Persist { .. }));
        assert_eq!(store.all_keys(), vec!["S1"]);
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_failed_write_preserves_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("encodings.json");
        let mut store = SnapshotStore::load(&path);
        store.put("s1", emb(0.1)).unwrap();

        // Block the temp file slot so the next write fails before the rename.
        std::fs::create_dir(tmp_path(&path)).unwrap();
        assert!(store.put("s2", emb(0.2)).is_err());

        let reloaded = SnapshotStore::load(&path);
        assert_eq!(reloaded.all_keys(), vec!["S1"]);
    }

    #[test]
    fn test_load_dedupes_and_normalizes_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("encodings.json");
        let entry = |id: &str, v: f32, day: u32| {
            format!(
                r#"{{"student_id":"{id}","embedding":{},"enrolled_at":"2024-01-{day:02}T00:00:00Z"}}"#,
                serde_json::to_string(&emb(v)).unwrap()
            )
        };
        let json = format!(
            "[{},{},{}]",
            entry("s1", 0.1, 1),
            entry("S1", 0.3, 2),
            entry("  ", 0.5, 3)
        );
        std::fs::write(&path, json).unwrap();

        let store = SnapshotStore::load(&path);
        assert_eq!(store.all_keys(), vec!["S1"]);
        assert_eq!(store.get("s1").unwrap().embedding, emb(0.3));
    }

    #[test]
    fn test_load_skips_wrong_length_embeddings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("encodings.json");
        let full = serde_json::to_string(&emb(0.9)).unwrap();
        let json = format!(
            r#"[
            {{"student_id":"GHOST","embedding":[],"enrolled_at":"2024-01-01T00:00:00Z"}},
            {{"student_id":"SHORT","embedding":[0.9,0.9],"enrolled_at":"2024-01-01T00:00:00Z"}},
            {{"student_id":"REAL","embedding":{full},"enrolled_at":"2024-01-01T00:00:00Z"}}
        ]"#
        );
        std::fs::write(&path, json).unwrap();

        let store = SnapshotStore::load(&path);
        assert_eq!(store.all_keys(), vec!["REAL"]);
    }
}
