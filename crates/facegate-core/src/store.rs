//! Durable storage for accepted images and trained models, keyed by subject.
//!
//! Layout: `<images_dir>/<subject>/face_<index>.jpg` for accepted source
//! images and `<models_dir>/<subject>_model.json` for the trained model.
//! Both are overwritten wholesale on each successful enrollment; there is no
//! merge or versioning.

use crate::types::{AcceptedFace, FaceModel};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("subject identifier is not storable: {0:?}")]
    InvalidSubject(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image encode failed for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("model serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Writes accepted images and the trained model under a subject's namespace.
pub trait EnrollmentStore {
    fn save_images(&mut self, subject: &str, faces: &[AcceptedFace]) -> Result<(), StoreError>;
    fn save_model(&mut self, subject: &str, model: &FaceModel) -> Result<(), StoreError>;
}

/// Filesystem-backed store.
pub struct FsEnrollmentStore {
    images_dir: PathBuf,
    models_dir: PathBuf,
}

impl FsEnrollmentStore {
    pub fn new(images_dir: PathBuf, models_dir: PathBuf) -> Self {
        Self { images_dir, models_dir }
    }

    /// Directory holding a subject's accepted images.
    pub fn subject_image_dir(&self, subject: &str) -> PathBuf {
        self.images_dir.join(subject)
    }

    /// Path of a subject's trained model artifact.
    pub fn subject_model_path(&self, subject: &str) -> PathBuf {
        self.models_dir.join(format!("{subject}_model.json"))
    }

    /// The subject identifier is opaque to the pipeline but becomes a path
    /// component here, so separators and traversal segments are refused.
    fn check_subject(subject: &str) -> Result<(), StoreError> {
        let bad = subject.is_empty()
            || subject.contains('/')
            || subject.contains('\\')
            || subject == "."
            || subject == "..";
        if bad {
            return Err(StoreError::InvalidSubject(subject.to_string()));
        }
        Ok(())
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io { path: path.to_path_buf(), source }
}

impl EnrollmentStore for FsEnrollmentStore {
    fn save_images(&mut self, subject: &str, faces: &[AcceptedFace]) -> Result<(), StoreError> {
        Self::check_subject(subject)?;

        let dir = self.subject_image_dir(subject);
        // Wholesale overwrite: a previous enrollment's images never mix with
        // this one's.
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(io_err(&dir))?;
        }
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        for (i, face) in faces.iter().enumerate() {
            let path = dir.join(format!("face_{i}.jpg"));
            face.source
                .save_with_format(&path, image::ImageFormat::Jpeg)
                .map_err(|source| StoreError::Encode { path: path.clone(), source })?;
        }

        tracing::info!(subject, count = faces.len(), dir = %dir.display(), "accepted images saved");
        Ok(())
    }

    fn save_model(&mut self, subject: &str, model: &FaceModel) -> Result<(), StoreError> {
        Self::check_subject(subject)?;

        fs::create_dir_all(&self.models_dir).map_err(io_err(&self.models_dir))?;

        let path = self.subject_model_path(subject);
        let data = serde_json::to_vec_pretty(model)?;
        fs::write(&path, data).map_err(io_err(&path))?;

        tracing::info!(subject, path = %path.display(), "face model saved");
        Ok(())
    }
}
