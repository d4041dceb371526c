use facematch_core::encoder::DEFAULT_DETECTION_CONFIDENCE;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on (default: 0.0.0.0:5001).
    pub bind_addr: SocketAddr,
    /// Path to the enrollment snapshot file.
    pub store_path: PathBuf,
    /// Path to the face encoder ONNX model.
    pub model_path: PathBuf,
    /// Minimum detector score for a face to be encoded.
    pub detection_confidence: f32,
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
    /// Whether to answer cross-origin requests from browser frontends.
    pub cors_enabled: bool,
}

impl Config {
    /// Load configuration from `FACEMATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let bind_addr = std::env::var("FACEMATCH_BIND")
            .ok()
            .and_then(|v| match v.parse() {
                Ok(addr) => Some(addr),
                Err(_) => {
                    tracing::warn!(value = %v, "invalid FACEMATCH_BIND; using default");
                    None
                }
            })
            .unwrap_or_else(default_bind);

        let store_path = std::env::var("FACEMATCH_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facematch_core::default_store_path());

        let model_path = std::env::var("FACEMATCH_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facematch_core::default_model_dir().join("face_encoder.onnx"));

        Self {
            bind_addr,
            store_path,
            model_path,
            detection_confidence: env_f32(
                "FACEMATCH_DETECTION_CONFIDENCE",
                DEFAULT_DETECTION_CONFIDENCE,
            ),
            max_upload_bytes: env_usize("FACEMATCH_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            cors_enabled: std::env::var("FACEMATCH_CORS_ENABLED")
                .map(|v| v != "0")
                .unwrap_or(true),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5001))
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bind() {
        assert_eq!(default_bind().to_string(), "0.0.0.0:5001");
    }

    #[test]
    fn test_env_parse_fallback() {
        assert_eq!(env_usize("FACEMATCH_TEST_UNSET_USIZE", 42), 42);
        assert_eq!(env_f32("FACEMATCH_TEST_UNSET_F32", 0.25), 0.25);
    }
}
