use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facematch_core::encoder::DEFAULT_DETECTION_CONFIDENCE;
use facematch_core::{
    normalize_student_id, validate_for_enrollment, EuclideanMatcher, FaceEncoder, Matcher,
    OnnxFaceEncoder,
};
use facematch_store::{FaceStore, SnapshotStore};
use std::path::PathBuf;

/// Works on the snapshot file directly. Stop facematchd first: whichever
/// process writes last wins.
#[derive(Parser)]
#[command(name = "facematch", about = "facematch enrollment store CLI")]
struct Cli {
    /// Enrollment snapshot file
    #[arg(long, env = "FACEMATCH_STORE_PATH", default_value_os_t = facematch_core::default_store_path())]
    store: PathBuf,

    /// Face encoder ONNX model
    #[arg(long, env = "FACEMATCH_MODEL_PATH", default_value_os_t = facematch_core::default_model_dir().join("face_encoder.onnx"))]
    model: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List enrolled identities
    List,
    /// Enroll (or re-enroll) an identity from an image with exactly one face
    Enroll {
        /// Identity key, e.g. a student ID
        #[arg(short, long)]
        id: String,
        /// Image file
        image: PathBuf,
    },
    /// Match every face in an image against the enrolled set
    Recognize {
        /// Image file
        image: PathBuf,
    },
    /// Remove an enrolled identity
    Unenroll {
        /// Identity key to remove; trimmed and upper-cased like an enroll key
        id: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut store = SnapshotStore::load(&cli.store);

    match cli.command {
        Commands::List => {
            for line in list_lines(&store) {
                println!("{line}");
            }
        }
        Commands::Enroll { id, image } => {
            let faces = encode_file(&cli.model, &image)?;
            let embedding = validate_for_enrollment(faces)?;
            let key = store.put(&id, embedding)?;
            println!("Enrolled {key} ({} total)", store.len());
        }
        Commands::Recognize { image } => {
            let faces = encode_file(&cli.model, &image)?;
            let queries: Vec<_> = faces.into_iter().map(|f| f.embedding).collect();
            let matches = EuclideanMatcher::new().match_all(&queries, store.entries());
            println!("{}", serde_json::to_string_pretty(&matches)?);
        }
        Commands::Unenroll { id } => {
            let key = unenroll(&mut store, &id)?;
            println!("Unenrolled {key}");
        }
    }

    Ok(())
}

fn list_lines(store: &dyn FaceStore) -> Vec<String> {
    if store.is_empty() {
        return vec!["No students enrolled".to_string()];
    }
    store
        .entries()
        .iter()
        .map(|e| format!("{}\tenrolled {}", e.student_id, e.enrolled_at.to_rfc3339()))
        .collect()
}

/// Returns the normalized key that was removed.
fn unenroll(store: &mut dyn FaceStore, id: &str) -> Result<String> {
    let Some(key) = normalize_student_id(id) else {
        bail!("student {id:?} not found");
    };
    if !store.remove(&key)? {
        bail!("student {key} not found");
    }
    Ok(key)
}

fn encode_file(
    model: &std::path::Path,
    image: &std::path::Path,
) -> Result<Vec<facematch_core::DetectedFace>> {
    let bytes = std::fs::read(image).with_context(|| format!("failed to read {}", image.display()))?;
    let mut encoder = OnnxFaceEncoder::load(&model.to_string_lossy(), DEFAULT_DETECTION_CONFIDENCE)
        .context("failed to load face encoder")?;
    let faces = encoder.detect_and_encode(&bytes)?;
    tracing::info!(image = %image.display(), faces = faces.len(), "image encoded");
    Ok(faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use facematch_core::{Embedding, EMBEDDING_DIM};
    use tempfile::TempDir;

    fn store_with(dir: &TempDir, ids: &[&str]) -> SnapshotStore {
        let mut store = SnapshotStore::load(dir.path().join("encodings.json"));
        for id in ids {
            store.put(id, Embedding::new(vec![0.1; EMBEDDING_DIM])).unwrap();
        }
        store
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from([
            "facematch", "--store", "/tmp/s.json", "enroll", "-i", "s1", "face.jpg",
        ])
        .unwrap();
        assert_eq!(cli.store, PathBuf::from("/tmp/s.json"));
        match cli.command {
            Commands::Enroll { id, image } => {
                assert_eq!(id, "s1");
                assert_eq!(image, PathBuf::from("face.jpg"));
            }
            _ => panic!("expected enroll"),
        }

        assert!(Cli::try_parse_from(["facematch", "enroll", "face.jpg"]).is_err());
        assert!(Cli::try_parse_from(["facematch", "unenroll"]).is_err());
    }

    #[test]
    fn test_list_lines() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[]);
        assert_eq!(list_lines(&store), vec!["No students enrolled"]);

        let store = store_with(&dir, &["b", "a"]);
        let lines = list_lines(&store);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("B\tenrolled "));
        assert!(lines[1].starts_with("A\tenrolled "));
    }

    #[test]
    fn test_unenroll_normalizes_and_persists() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &["s1", "s2"]);

        assert_eq!(unenroll(&mut store, " s1 ").unwrap(), "S1");
        assert_eq!(store.all_keys(), vec!["S2"]);

        let reloaded = SnapshotStore::load(dir.path().join("encodings.json"));
        assert_eq!(reloaded.all_keys(), vec!["S2"]);
    }

    #[test]
    fn test_unenroll_unknown_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &["s1"]);

        let err = unenroll(&mut store, "nobody").unwrap_err();
        assert_eq!(err.to_string(), "student NOBODY not found");
        assert!(unenroll(&mut store, "   ").is_err());
        assert_eq!(store.all_keys(), vec!["S1"]);
    }
}
