//! Face location capability.
//!
//! The pipeline consumes faces through the [`FaceLocator`] seam; the concrete
//! implementation is an SCRFD (Sample and Computation Redistribution for
//! Efficient Face Detection) ONNX model with 3-stride anchor-free decoding and
//! NMS post-processing, run on CPU via ONNX Runtime.

use crate::discovery;
use crate::types::FaceBox;
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DETECT_INPUT_SIZE: usize = 640;
const DETECT_MEAN: f32 = 127.5;
const DETECT_STD: f32 = 128.0;
const DETECT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DETECT_NMS_THRESHOLD: f32 = 0.4;
const DETECT_STRIDES: [usize; 3] = [8, 16, 32];
const DETECT_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("face detection model not found: {0} — install under /usr/share/facegate/models or set FACEGATE_MODEL_DIR")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Locates face bounding boxes in a prepared (grayscale, equalized) image.
pub trait FaceLocator {
    fn locate(&mut self, image: &GrayImage) -> Result<Vec<FaceBox>, LocatorError>;
}

/// Hands out a ready [`FaceLocator`], initializing it if needed.
///
/// Acquisition failure is the pipeline's "detector unavailable" condition:
/// fatal for the whole batch, surfaced once per request.
pub trait LocatorProvider {
    fn acquire(&mut self) -> Result<&mut dyn FaceLocator, LocatorError>;
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputIndices = (usize, usize);

/// SCRFD-based face locator.
pub struct OnnxFaceLocator {
    session: Session,
    input_height: usize,
    input_width: usize,
    /// Per-stride output indices [(score, bbox)] for strides [8, 16, 32].
    /// Discovered by name at load time; falls back to positional ordering.
    stride_indices: [StrideOutputIndices; 3],
}

impl OnnxFaceLocator {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, LocatorError> {
        if !model_path.is_file() {
            return Err(LocatorError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();
        let num_outputs = output_names.len();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded face detection model"
        );

        // Score/bbox pairs for 3 strides; landmark outputs, when present, are ignored.
        if num_outputs < 6 {
            return Err(LocatorError::InferenceFailed(format!(
                "SCRFD model requires at least 6 outputs (3 strides × score/bbox), got {num_outputs}"
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "detector output tensor mapping");

        Ok(Self {
            session,
            input_height: DETECT_INPUT_SIZE,
            input_width: DETECT_INPUT_SIZE,
            stride_indices,
        })
    }
}

impl FaceLocator for OnnxFaceLocator {
    /// Detect faces, returning bounding boxes in source-image coordinates,
    /// sorted by descending confidence.
    fn locate(&mut self, image: &GrayImage) -> Result<Vec<FaceBox>, LocatorError> {
        let (input, letterbox) = preprocess(image, self.input_width, self.input_height);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();

        for (stride_pos, &stride) in DETECT_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| LocatorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| LocatorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            all_detections.extend(decode_stride(
                scores,
                bboxes,
                stride,
                self.input_width,
                &letterbox,
                DETECT_CONFIDENCE_THRESHOLD,
            ));
        }

        let mut result = nms(all_detections, DETECT_NMS_THRESHOLD);
        result.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(result)
    }
}

/// Lazily-initialized, memoizing [`LocatorProvider`] backed by [`OnnxFaceLocator`].
///
/// The first successful acquisition is cached for the provider's lifetime;
/// failed initialization is retried on the next request, so a model file
/// installed after startup is picked up without a daemon restart.
pub struct LazyOnnxLocator {
    model_path: Option<PathBuf>,
    locator: Option<OnnxFaceLocator>,
}

impl LazyOnnxLocator {
    /// Discover the model through the standard search path on first use.
    pub fn discovered() -> Self {
        Self { model_path: None, locator: None }
    }

    /// Use an explicit model path instead of discovery.
    pub fn with_model_path(path: PathBuf) -> Self {
        Self { model_path: Some(path), locator: None }
    }
}

impl LocatorProvider for LazyOnnxLocator {
    fn acquire(&mut self) -> Result<&mut dyn FaceLocator, LocatorError> {
        if self.locator.is_none() {
            let path = match &self.model_path {
                Some(p) => p.clone(),
                None => discovery::discover_model(discovery::DETECTOR_MODEL_FILE)
                    .ok_or_else(|| {
                        LocatorError::ModelNotFound(discovery::DETECTOR_MODEL_FILE.to_string())
                    })?,
            };
            self.locator = Some(OnnxFaceLocator::load(&path)?);
        }
        Ok(self
            .locator
            .as_mut()
            .expect("locator slot filled by the branch above"))
    }
}

/// Letterbox a grayscale image into an NCHW float tensor.
///
/// The image is scaled to fit `input_w` × `input_h` preserving aspect ratio,
/// centered with mean-value padding (which normalizes to 0.0), and replicated
/// across the three input channels.
fn preprocess(image: &GrayImage, input_w: usize, input_h: usize) -> (Array4<f32>, LetterboxInfo) {
    let (width, height) = image.dimensions();

    let scale_w = input_w as f32 / width as f32;
    let scale_h = input_h as f32 / height as f32;
    let scale = scale_w.min(scale_h);

    let new_w = ((width as f32 * scale).round() as u32).max(1);
    let new_h = ((height as f32 * scale).round() as u32).max(1);
    let pad_x = (input_w as f32 - new_w as f32) / 2.0;
    let pad_y = (input_h as f32 - new_h as f32) / 2.0;

    let letterbox = LetterboxInfo { scale, pad_x, pad_y };

    let resized = image::imageops::resize(image, new_w, new_h, image::imageops::FilterType::Triangle);

    let pad_x_start = pad_x.floor() as u32;
    let pad_y_start = pad_y.floor() as u32;

    let mut tensor = Array4::<f32>::zeros((1, 3, input_h, input_w));

    for y in 0..input_h as u32 {
        for x in 0..input_w as u32 {
            let pixel = if y >= pad_y_start
                && y < pad_y_start + new_h
                && x >= pad_x_start
                && x < pad_x_start + new_w
            {
                resized.get_pixel(x - pad_x_start, y - pad_y_start)[0] as f32
            } else {
                DETECT_MEAN
            };

            let normalized = (pixel - DETECT_MEAN) / DETECT_STD;
            // Grayscale → 3-channel: replicate Y across R, G, B.
            tensor[[0, 0, y as usize, x as usize]] = normalized;
            tensor[[0, 1, y as usize, x as usize]] = normalized;
            tensor[[0, 2, y as usize, x as usize]] = normalized;
        }
    }

    (tensor, letterbox)
}

/// Discover score/bbox output tensor ordering by name.
///
/// SCRFD exports name tensors either as "score_8"/"bbox_8"/... or with generic
/// numeric names. Named pattern → mapped to stride slots; otherwise the
/// standard positional ordering applies:
///   [0-2] = scores (strides 8, 16, 32)
///   [3-5] = bboxes (strides 8, 16, 32)
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named = DETECT_STRIDES
        .iter()
        .all(|&stride| find("score", stride).is_some() && find("bbox", stride).is_some());

    if named {
        tracing::debug!("detector: using name-based output tensor mapping");
        std::array::from_fn(|i| {
            let stride = DETECT_STRIDES[i];
            // Both lookups verified present above.
            match (find("score", stride), find("bbox", stride)) {
                (Some(s), Some(b)) => (s, b),
                _ => (i, i + 3),
            }
        })
    } else {
        tracing::debug!(
            ?names,
            "detector: output names not recognized, using positional mapping [0-2]=scores, [3-5]=bboxes"
        );
        [(0, 3), (1, 4), (2, 5)]
    }
}

/// Decode detections for a single stride level, mapping boxes from the
/// letterboxed input space back to source-image coordinates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    input_width: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<FaceBox> {
    let grid_w = input_width / stride;
    let grid_h = input_width / stride;
    let num_anchors = grid_h * grid_w * DETECT_ANCHORS_PER_CELL;

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / DETECT_ANCHORS_PER_CELL;
        let cy = (anchor_idx / grid_w) as f32;
        let cx = (anchor_idx % grid_w) as f32;

        let anchor_cx = cx * stride as f32;
        let anchor_cy = cy * stride as f32;

        // bbox tensor layout: [left, top, right, bottom] offsets in stride units.
        let bbox_off = idx * 4;
        if bbox_off + 3 >= bboxes.len() {
            continue;
        }
        let x1 = anchor_cx - bboxes[bbox_off] * stride as f32;
        let y1 = anchor_cy - bboxes[bbox_off + 1] * stride as f32;
        let x2 = anchor_cx + bboxes[bbox_off + 2] * stride as f32;
        let y2 = anchor_cy + bboxes[bbox_off + 3] * stride as f32;

        let orig_x1 = (x1 - letterbox.pad_x) / letterbox.scale;
        let orig_y1 = (y1 - letterbox.pad_y) / letterbox.scale;
        let orig_x2 = (x2 - letterbox.pad_x) / letterbox.scale;
        let orig_y2 = (y2 - letterbox.pad_y) / letterbox.scale;

        detections.push(FaceBox {
            x: orig_x1,
            y: orig_y1,
            width: orig_x2 - orig_x1,
            height: orig_y2 - orig_y1,
            confidence: score,
        });
    }

    detections
}

/// Non-Maximum Suppression: remove overlapping detections.
fn nms(mut detections: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if suppressed[j] {
                continue;
            }
            if iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection-over-Union between two face boxes.
fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_w = (x2 - x1).max(0.0);
    let inter_h = (y2 - y1).max(0.0);
    let inter_area = inter_w * inter_h;

    let area_a = a.width * a.height;
    let area_b = b.width * b.height;
    let union_area = area_a + area_b - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}
