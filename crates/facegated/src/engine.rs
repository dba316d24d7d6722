use crate::config::Config;
use facegate_core::{
    pipeline::BatchLimits, DistinctnessChecker, EmbeddingTrainer, EnrollmentPipeline,
    FsEnrollmentStore, LazyOnnxLocator, Photo, ValidationReport,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Enroll {
        subject: String,
        photos: Vec<Photo>,
        reply: oneshot::Sender<ValidationReport>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run one enrollment request to completion on the engine thread.
    pub async fn enroll(
        &self,
        subject: String,
        photos: Vec<Photo>,
    ) -> Result<ValidationReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll { subject, photos, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the enrollment engine on a dedicated OS thread.
///
/// The thread owns the whole pipeline, including the ONNX sessions (which
/// need exclusive access), and processes requests one at a time. That also
/// serializes the persistence/training stage: two concurrent enrollments for
/// the same subject can never interleave their writes.
///
/// Model loading is lazy; a missing model file surfaces per request as a
/// "detector unavailable" error instead of failing startup.
pub fn spawn_engine(config: &Config) -> EngineHandle {
    let locator = match &config.detector_model {
        Some(path) => LazyOnnxLocator::with_model_path(path.clone()),
        None => LazyOnnxLocator::discovered(),
    };
    let trainer = match &config.embedder_model {
        Some(path) => EmbeddingTrainer::with_model_path(path.clone()),
        None => EmbeddingTrainer::discovered(),
    };
    let store = FsEnrollmentStore::new(config.images_dir.clone(), config.models_dir.clone());

    let limits = BatchLimits {
        min_photos: config.min_photos,
        max_photos: config.max_photos,
    };
    let checker = DistinctnessChecker::new(config.compare_size, config.similarity_threshold);

    let mut pipeline = EnrollmentPipeline::with_policy(locator, trainer, store, limits, checker);

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll { subject, photos, reply } => {
                        let report = pipeline.enroll(&subject, &photos);
                        let _ = reply.send(report);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}
