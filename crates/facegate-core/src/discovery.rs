//! Locating ONNX model files on disk.
//!
//! Search order: `FACEGATE_MODEL_DIR` override, fixed system directories, then
//! the per-user cache directory. First directory containing the requested file
//! wins. The cache leg replaces the original service's bundled-resource
//! extraction: operators drop model files there when no system install exists.

use std::path::PathBuf;

/// SCRFD face detection model file name.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace embedding model file name.
pub const EMBEDDER_MODEL_FILE: &str = "w600k_r50.onnx";

const MODEL_DIR_ENV: &str = "FACEGATE_MODEL_DIR";
const SYSTEM_MODEL_DIRS: &[&str] = &[
    "/usr/share/facegate/models",
    "/usr/local/share/facegate/models",
];

/// Per-user cache directory for model files (`~/.cache/facegate` on Linux).
pub fn cache_model_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("facegate"))
}

/// Directories searched for model files, in precedence order.
pub fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs_out = Vec::new();
    if let Ok(dir) = std::env::var(MODEL_DIR_ENV) {
        dirs_out.push(PathBuf::from(dir));
    }
    dirs_out.extend(SYSTEM_MODEL_DIRS.iter().map(PathBuf::from));
    if let Some(cache) = cache_model_dir() {
        dirs_out.push(cache);
    }
    dirs_out
}

/// Find `file_name` in the standard candidate directories.
pub fn discover_model(file_name: &str) -> Option<PathBuf> {
    let found = discover_in(&candidate_dirs(), file_name);
    match &found {
        Some(path) => tracing::debug!(file = file_name, path = %path.display(), "model file found"),
        None => tracing::warn!(file = file_name, "model file not found in any candidate directory"),
    }
    found
}

/// Find `file_name` in an explicit ordered list of directories.
pub fn discover_in(dirs_in: &[PathBuf], file_name: &str) -> Option<PathBuf> {
    dirs_in
        .iter()
        .map(|d| d.join(file_name))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_in_first_existing_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("m.onnx"), b"a").unwrap();
        std::fs::write(second.path().join("m.onnx"), b"b").unwrap();

        let dirs_in = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let found = discover_in(&dirs_in, "m.onnx").unwrap();
        assert_eq!(found, first.path().join("m.onnx"));
    }

    #[test]
    fn test_discover_in_skips_missing_dirs() {
        let present = tempfile::tempdir().unwrap();
        std::fs::write(present.path().join("m.onnx"), b"x").unwrap();

        let dirs_in = vec![
            PathBuf::from("/nonexistent/facegate/models"),
            present.path().to_path_buf(),
        ];
        let found = discover_in(&dirs_in, "m.onnx").unwrap();
        assert_eq!(found, present.path().join("m.onnx"));
    }

    #[test]
    fn test_discover_in_none_when_absent() {
        let empty = tempfile::tempdir().unwrap();
        let dirs_in = vec![empty.path().to_path_buf()];
        assert!(discover_in(&dirs_in, "m.onnx").is_none());
    }

    #[test]
    fn test_discover_in_ignores_directories() {
        // A directory with the model's name must not satisfy the search.
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("m.onnx")).unwrap();
        let dirs_in = vec![root.path().to_path_buf()];
        assert!(discover_in(&dirs_in, "m.onnx").is_none());
    }
}
