//! Face encoder seam and its ONNX Runtime implementation.
//!
//! The encoder is an opaque collaborator: image bytes in, one
//! `{bounding box, embedding}` per detected face out. The bundled
//! implementation runs a fused detect+embed ONNX graph and does no
//! alignment of its own.

use crate::types::{BoundingBox, DetectedFace, Embedding, EMBEDDING_DIM};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ENCODER_INPUT_SIZE: u32 = 640;
const ENCODER_MEAN: f32 = 127.5;
const ENCODER_STD: f32 = 128.0;
/// Per-face row in the box output: x1, y1, x2, y2, score.
const BOX_STRIDE: usize = 5;
pub const DEFAULT_DETECTION_CONFIDENCE: f32 = 0.5;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

impl EncodeError {
    /// True when the input image itself was unusable, as opposed to an
    /// encoder-side failure.
    pub fn is_bad_input(&self) -> bool {
        matches!(self, EncodeError::Decode(_))
    }
}

/// Detects faces in an encoded image and returns one embedding per face.
pub trait FaceEncoder {
    fn detect_and_encode(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>, EncodeError>;
}

/// ONNX-backed face encoder.
///
/// Expects a model taking a `1x3x640x640` RGB tensor and producing two
/// outputs: `[N, 5]` boxes in input coordinates and `[N, 128]` embeddings.
pub struct OnnxFaceEncoder {
    session: Session,
    min_confidence: f32,
}

impl OnnxFaceEncoder {
    /// Load the encoder model from the given path.
    pub fn load(model_path: &str, min_confidence: f32) -> Result<Self, EncodeError> {
        if !Path::new(model_path).exists() {
            return Err(EncodeError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        if session.outputs().len() < 2 {
            return Err(EncodeError::InferenceFailed(format!(
                "encoder model requires 2 outputs (boxes, embeddings), got {}",
                session.outputs().len()
            )));
        }

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face encoder model"
        );

        Ok(Self {
            session,
            min_confidence,
        })
    }

    /// Resize an RGB image to the model input and convert it to a normalized NCHW tensor.
    fn preprocess(rgb: &RgbImage) -> Array4<f32> {
        let size = ENCODER_INPUT_SIZE as usize;
        let resized = image::imageops::resize(rgb, ENCODER_INPUT_SIZE, ENCODER_INPUT_SIZE, FilterType::Triangle);
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (pixel[c] as f32 - ENCODER_MEAN) / ENCODER_STD;
            }
        }

        tensor
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn detect_and_encode(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>, EncodeError> {
        let rgb = image::load_from_memory(image)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let input = Self::preprocess(&rgb);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, boxes) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncodeError::InferenceFailed(format!("boxes: {e}")))?;
        let (_, embeddings) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncodeError::InferenceFailed(format!("embeddings: {e}")))?;

        let scale_x = width as f32 / ENCODER_INPUT_SIZE as f32;
        let scale_y = height as f32 / ENCODER_INPUT_SIZE as f32;
        let faces = decode_outputs(boxes, embeddings, scale_x, scale_y, self.min_confidence)?;

        tracing::debug!(width, height, faces = faces.len(), "encoded image");
        Ok(faces)
    }
}

/// Pair box rows with embedding rows, drop low-confidence faces and map
/// boxes back to source image coordinates.
fn decode_outputs(
    boxes: &[f32],
    embeddings: &[f32],
    scale_x: f32,
    scale_y: f32,
    min_confidence: f32,
) -> Result<Vec<DetectedFace>, EncodeError> {
    if boxes.len() % BOX_STRIDE != 0 {
        return Err(EncodeError::InferenceFailed(format!(
            "box output length {} is not a multiple of {BOX_STRIDE}",
            boxes.len()
        )));
    }
    let count = boxes.len() / BOX_STRIDE;
    if embeddings.len() != count * EMBEDDING_DIM {
        return Err(EncodeError::InferenceFailed(format!(
            "expected {count} x {EMBEDDING_DIM}-dim embeddings, got {} values",
            embeddings.len()
        )));
    }

    let faces = boxes
        .chunks_exact(BOX_STRIDE)
        .zip(embeddings.chunks_exact(EMBEDDING_DIM))
        .filter(|(row, _)| row[4] >= min_confidence)
        .map(|(row, emb)| DetectedFace {
            bbox: BoundingBox {
                x: row[0] * scale_x,
                y: row[1] * scale_y,
                width: (row[2] - row[0]) * scale_x,
                height: (row[3] - row[1]) * scale_y,
                confidence: row[4],
            },
            embedding: Embedding::new(emb.to_vec()),
        })
        .collect();

    Ok(faces)
}
