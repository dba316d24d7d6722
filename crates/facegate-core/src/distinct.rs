//! Pairwise distinctness policy for accepted face crops.
//!
//! Two crops are "similar" when their mean absolute pixel difference, after
//! resizing both to a fixed comparison size, falls below a threshold. The
//! batch filter is a greedy first-match scan: the earlier survivor always
//! wins, and a rejected duplicate is never compared against later faces.

use crate::types::AcceptedFace;
use image::imageops::FilterType;
use image::GrayImage;

const DEFAULT_COMPARE_SIZE: u32 = 100;
/// Mean absolute difference below this (on the 8-bit intensity scale) marks
/// two crops as duplicate captures.
const DEFAULT_SIMILARITY_THRESHOLD: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct DistinctnessChecker {
    compare_size: u32,
    threshold: f64,
}

impl Default for DistinctnessChecker {
    fn default() -> Self {
        Self {
            compare_size: DEFAULT_COMPARE_SIZE,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl DistinctnessChecker {
    pub fn new(compare_size: u32, threshold: f64) -> Self {
        Self { compare_size, threshold }
    }

    /// Whether two face crops look like duplicate captures.
    ///
    /// Symmetric in its arguments. A crop that cannot be compared (zero area)
    /// yields `false`: comparison failure is deliberately lenient and never
    /// rejects a face. Flipping that polarity is a behavior change callers
    /// depend on not happening.
    pub fn are_similar(&self, a: &GrayImage, b: &GrayImage) -> bool {
        match self.mean_abs_difference(a, b) {
            Some(mean) => mean < self.threshold,
            None => false,
        }
    }

    /// Mean absolute difference over the fixed comparison size, or `None`
    /// when either crop is degenerate.
    fn mean_abs_difference(&self, a: &GrayImage, b: &GrayImage) -> Option<f64> {
        if a.width() == 0 || a.height() == 0 || b.width() == 0 || b.height() == 0 {
            return None;
        }
        if self.compare_size == 0 {
            return None;
        }

        let size = self.compare_size;
        let ra = image::imageops::resize(a, size, size, FilterType::Triangle);
        let rb = image::imageops::resize(b, size, size, FilterType::Triangle);

        let total: u64 = ra
            .pixels()
            .zip(rb.pixels())
            .map(|(pa, pb)| (pa[0] as i32 - pb[0] as i32).unsigned_abs() as u64)
            .sum();

        Some(total as f64 / (size as f64 * size as f64))
    }

    /// Greedy first-match duplicate filter over accepted faces, in order.
    ///
    /// The first face is kept unconditionally. Each later face is compared
    /// against every already-kept face; the first match rejects it with an
    /// error naming the duplicate and the face it collided with. Survivors
    /// keep their submission order.
    pub fn filter_distinct(&self, faces: Vec<AcceptedFace>) -> (Vec<AcceptedFace>, Vec<String>) {
        let mut kept: Vec<AcceptedFace> = Vec::with_capacity(faces.len());
        let mut errors = Vec::new();

        for face in faces {
            let duplicate_of = kept
                .iter()
                .find(|existing| self.are_similar(&face.crop, &existing.crop));

            match duplicate_of {
                Some(existing) => {
                    tracing::debug!(
                        duplicate = %face.file_name,
                        original = %existing.file_name,
                        "face rejected as duplicate"
                    );
                    errors.push(format!(
                        "photo {} is too similar to {}",
                        face.file_name, existing.file_name
                    ));
                }
                None => kept.push(face),
            }
        }

        (kept, errors)
    }
}
