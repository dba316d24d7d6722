//! Face model training capability.
//!
//! The pipeline hands accepted face crops to a [`FaceTrainer`] and receives a
//! persistable per-subject model. The concrete implementation embeds each crop
//! with an ArcFace-style ONNX model and labels the resulting gallery with the
//! subject identifier.

use crate::discovery;
use crate::types::{AcceptedFace, Embedding, FaceModel};
use image::imageops::FilterType;
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::PathBuf;
use thiserror::Error;

const EMBED_INPUT_SIZE: usize = 112;
const EMBED_MEAN: f32 = 127.5;
const EMBED_STD: f32 = 127.5; // symmetric normalization, unlike the detector
const EMBED_DIM: usize = 512;
const EMBED_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum TrainerError {
    #[error("embedding model not found: {0} — install under /usr/share/facegate/models or set FACEGATE_MODEL_DIR")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("cannot train on an empty face set")]
    EmptyFaceSet,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Produces a recognizable-face model from accepted crops and a subject label.
pub trait FaceTrainer {
    fn train(&mut self, subject: &str, faces: &[AcceptedFace]) -> Result<FaceModel, TrainerError>;
}

/// ArcFace-based trainer: one L2-normalized embedding per accepted crop.
///
/// The ONNX session is loaded on first use and kept for the trainer's
/// lifetime; a failed load is retried on the next call.
pub struct EmbeddingTrainer {
    model_path: Option<PathBuf>,
    session: Option<Session>,
}

impl EmbeddingTrainer {
    /// Discover the model through the standard search path on first use.
    pub fn discovered() -> Self {
        Self { model_path: None, session: None }
    }

    /// Use an explicit model path instead of discovery.
    pub fn with_model_path(path: PathBuf) -> Self {
        Self { model_path: Some(path), session: None }
    }

    fn session(&mut self) -> Result<&mut Session, TrainerError> {
        if self.session.is_none() {
            let path = match &self.model_path {
                Some(p) => p.clone(),
                None => discovery::discover_model(discovery::EMBEDDER_MODEL_FILE)
                    .ok_or_else(|| {
                        TrainerError::ModelNotFound(discovery::EMBEDDER_MODEL_FILE.to_string())
                    })?,
            };
            if !path.is_file() {
                return Err(TrainerError::ModelNotFound(path.display().to_string()));
            }

            let session = Session::builder()?
                .with_intra_threads(2)?
                .commit_from_file(&path)?;

            tracing::info!(path = %path.display(), "loaded embedding model");
            self.session = Some(session);
        }
        Ok(self
            .session
            .as_mut()
            .expect("session slot filled by the branch above"))
    }

    fn embed(&mut self, crop: &GrayImage) -> Result<Embedding, TrainerError> {
        let input = preprocess(crop);
        let session = self.session()?;

        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| TrainerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();

        if raw.len() != EMBED_DIM {
            return Err(TrainerError::InferenceFailed(format!(
                "expected {EMBED_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding {
            values: l2_normalize(raw),
            model_version: Some(EMBED_MODEL_VERSION.to_string()),
        })
    }
}

impl FaceTrainer for EmbeddingTrainer {
    fn train(&mut self, subject: &str, faces: &[AcceptedFace]) -> Result<FaceModel, TrainerError> {
        if faces.is_empty() {
            return Err(TrainerError::EmptyFaceSet);
        }

        let mut embeddings = Vec::with_capacity(faces.len());
        for face in faces {
            embeddings.push(self.embed(&face.crop)?);
        }

        tracing::info!(subject, count = embeddings.len(), "face model trained");

        Ok(FaceModel {
            subject: subject.to_string(),
            embeddings,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// Resize a face crop to the embedding input size and lay it out as an
/// NCHW float tensor, grayscale replicated across the three channels.
fn preprocess(crop: &GrayImage) -> Array4<f32> {
    let size = EMBED_INPUT_SIZE as u32;
    let resized = image::imageops::resize(crop, size, size, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE));

    for y in 0..EMBED_INPUT_SIZE {
        for x in 0..EMBED_INPUT_SIZE {
            let pixel = resized.get_pixel(x as u32, y as u32)[0] as f32;
            let normalized = (pixel - EMBED_MEAN) / EMBED_STD;
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }

    tensor
}

fn l2_normalize(raw: Vec<f32>) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_preprocess_output_shape() {
        let crop = GrayImage::from_pixel(80, 120, Luma([128]));
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_normalization() {
        let crop = GrayImage::from_pixel(EMBED_INPUT_SIZE as u32, EMBED_INPUT_SIZE as u32, Luma([128]));
        let tensor = preprocess(&crop);
        let expected = (128.0 - EMBED_MEAN) / EMBED_STD;
        let val = tensor[[0, 0, 0, 0]];
        assert!((val - expected).abs() < 1e-6, "got {val}, expected {expected}");
    }

    #[test]
    fn test_preprocess_channels_identical() {
        let mut crop = GrayImage::new(90, 90);
        for (i, p) in crop.pixels_mut().enumerate() {
            p[0] = (i % 256) as u8;
        }
        let tensor = preprocess(&crop);
        for y in 0..EMBED_INPUT_SIZE {
            for x in 0..EMBED_INPUT_SIZE {
                assert_eq!(tensor[[0, 0, y, x]], tensor[[0, 1, y, x]]);
                assert_eq!(tensor[[0, 1, y, x]], tensor[[0, 2, y, x]]);
            }
        }
    }

    #[test]
    fn test_l2_normalize_unit_length() {
        let values = l2_normalize(vec![3.0, 4.0]);
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((values[0] - 0.6).abs() < 1e-6);
        assert!((values[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_unchanged() {
        let values = l2_normalize(vec![0.0, 0.0, 0.0]);
        assert_eq!(values, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_model_is_reported() {
        let mut trainer =
            EmbeddingTrainer::with_model_path(PathBuf::from("/nonexistent/w600k_r50.onnx"));
        let err = trainer.session().err().expect("load must fail");
        assert!(matches!(err, TrainerError::ModelNotFound(_)));
    }
}
