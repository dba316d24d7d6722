use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub listen_addr: String,
    /// Directory receiving accepted images, one subdirectory per subject.
    pub images_dir: PathBuf,
    /// Directory receiving trained model artifacts.
    pub models_dir: PathBuf,
    /// Explicit detector model path; discovery search path when unset.
    pub detector_model: Option<PathBuf>,
    /// Explicit embedding model path; discovery search path when unset.
    pub embedder_model: Option<PathBuf>,
    /// Minimum photos per enrollment batch.
    pub min_photos: usize,
    /// Maximum photos per enrollment batch.
    pub max_photos: usize,
    /// Mean-absolute-difference cutoff below which two crops are duplicates.
    pub similarity_threshold: f64,
    /// Square size crops are resampled to before comparison.
    pub compare_size: u32,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            listen_addr: std::env::var("FACEGATE_LISTEN_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            images_dir: std::env::var("FACEGATE_IMAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/data/images")),
            models_dir: std::env::var("FACEGATE_MODELS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/data/models")),
            detector_model: std::env::var("FACEGATE_DETECTOR_MODEL").ok().map(PathBuf::from),
            embedder_model: std::env::var("FACEGATE_EMBEDDER_MODEL").ok().map(PathBuf::from),
            min_photos: env_usize("FACEGATE_MIN_PHOTOS", 5),
            max_photos: env_usize("FACEGATE_MAX_PHOTOS", 8),
            similarity_threshold: env_f64("FACEGATE_SIMILARITY_THRESHOLD", 100.0),
            compare_size: env_u32("FACEGATE_COMPARE_SIZE", 100),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
