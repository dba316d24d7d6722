use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

/// One submitted photograph: raw bytes plus the client-supplied file name, if any.
#[derive(Debug, Clone)]
pub struct Photo {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl Photo {
    pub fn new(file_name: Option<String>, bytes: Vec<u8>) -> Self {
        Self { file_name, bytes }
    }

    /// Effective file name: the supplied one, or `photo_<index>.jpg` when missing/empty.
    pub fn effective_name(&self, index: usize) -> String {
        match self.file_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("photo_{index}.jpg"),
        }
    }
}

/// Bounding box for a detected face, in source-image pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// A face region clamped to image bounds, ready for cropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    /// Clamp the box to a `width` × `height` image.
    ///
    /// Returns `None` when the clamped region has no area; such a detection
    /// is treated as no detection at all.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<CropRegion> {
        let x0 = self.x.max(0.0).floor() as u32;
        let y0 = self.y.max(0.0).floor() as u32;
        if x0 >= width || y0 >= height {
            return None;
        }
        let x1 = ((self.x + self.width).ceil().max(0.0) as u32).min(width);
        let y1 = ((self.y + self.height).ceil().max(0.0) as u32).min(height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(CropRegion {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// A photo that passed single-face validation. Request-scoped: dropped when
/// the enrollment report is returned.
pub struct AcceptedFace {
    pub file_name: String,
    /// The decoded source image, persisted verbatim on commit.
    pub source: DynamicImage,
    /// The equalized grayscale face region, fed to distinctness and training.
    pub crop: GrayImage,
}

/// The sole output of an enrollment request.
///
/// Wire shape kept compatible with the original REST service:
/// `{"fotosValidas": [...], "errores": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    #[serde(rename = "fotosValidas")]
    pub valid_file_names: Vec<String>,
    #[serde(rename = "errores")]
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// A report that carries a single fatal error and no accepted photos.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            valid_file_names: Vec::new(),
            errors: vec![message.into()],
        }
    }
}

/// Face embedding vector produced by the trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

/// The persisted per-subject model: an ordered gallery of embeddings, one per
/// accepted face crop, all labeled with the same subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceModel {
    pub subject: String,
    pub embeddings: Vec<Embedding>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_name_supplied() {
        let p = Photo::new(Some("selfie.jpg".into()), vec![]);
        assert_eq!(p.effective_name(3), "selfie.jpg");
    }

    #[test]
    fn test_effective_name_missing() {
        let p = Photo::new(None, vec![]);
        assert_eq!(p.effective_name(3), "photo_3.jpg");
    }

    #[test]
    fn test_effective_name_empty() {
        let p = Photo::new(Some(String::new()), vec![]);
        assert_eq!(p.effective_name(0), "photo_0.jpg");
    }

    #[test]
    fn test_clamp_inside() {
        let b = FaceBox { x: 10.0, y: 20.0, width: 30.0, height: 40.0, confidence: 0.9 };
        let r = b.clamp_to(100, 100).unwrap();
        assert_eq!(r, CropRegion { x: 10, y: 20, width: 30, height: 40 });
    }

    #[test]
    fn test_clamp_overhanging() {
        let b = FaceBox { x: -5.0, y: 90.0, width: 20.0, height: 20.0, confidence: 0.9 };
        let r = b.clamp_to(100, 100).unwrap();
        assert_eq!(r.x, 0);
        assert_eq!(r.y, 90);
        assert_eq!(r.width, 15);
        assert_eq!(r.height, 10);
    }

    #[test]
    fn test_clamp_degenerate_is_none() {
        let zero = FaceBox { x: 10.0, y: 10.0, width: 0.0, height: 5.0, confidence: 0.9 };
        assert!(zero.clamp_to(100, 100).is_none());

        let outside = FaceBox { x: 200.0, y: 10.0, width: 30.0, height: 30.0, confidence: 0.9 };
        assert!(outside.clamp_to(100, 100).is_none());

        let negative = FaceBox { x: 10.0, y: 10.0, width: -4.0, height: 8.0, confidence: 0.9 };
        assert!(negative.clamp_to(100, 100).is_none());
    }

    #[test]
    fn test_report_wire_shape() {
        let report = ValidationReport {
            valid_file_names: vec!["a.jpg".into()],
            errors: vec!["no face detected in: b.jpg".into()],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["fotosValidas"][0], "a.jpg");
        assert_eq!(json["errores"][0], "no face detected in: b.jpg");
    }

    #[test]
    fn test_report_roundtrip() {
        let report = ValidationReport::fatal("at least 5 photos are required");
        let json = serde_json::to_string(&report).unwrap();
        let back: ValidationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        assert!(back.valid_file_names.is_empty());
        assert_eq!(back.errors.len(), 1);
    }
}
