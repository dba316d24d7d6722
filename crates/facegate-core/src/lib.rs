//! facegate-core — Biometric enrollment validation.
//!
//! Validates a batch of candidate photographs for one subject (batch-size
//! gating, single-face enforcement, pairwise distinctness) and, when enough
//! faces survive, persists the images and trains a per-subject face model.
//! Detection uses SCRFD and training uses ArcFace embeddings, both via ONNX
//! Runtime, behind injectable capability traits.

pub mod discovery;
pub mod distinct;
pub mod locator;
pub mod pipeline;
pub mod store;
pub mod trainer;
pub mod types;

pub use distinct::DistinctnessChecker;
pub use locator::{FaceLocator, LazyOnnxLocator, LocatorProvider, OnnxFaceLocator};
pub use pipeline::{BatchLimits, EnrollmentPipeline};
pub use store::{EnrollmentStore, FsEnrollmentStore};
pub use trainer::{EmbeddingTrainer, FaceTrainer};
pub use types::{AcceptedFace, Embedding, FaceBox, FaceModel, Photo, ValidationReport};
