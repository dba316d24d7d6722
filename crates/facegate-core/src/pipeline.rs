//! The enrollment pipeline: batch gating, per-photo single-face enforcement,
//! distinctness filtering, and the commit to storage and training.
//!
//! Expected failures never escape as `Err`: every rejection becomes exactly
//! one human-readable entry in the report's error list and processing
//! continues wherever the stage allows it. Only the batch-size and
//! detector-availability gates abort the whole request.

use crate::distinct::DistinctnessChecker;
use crate::locator::{FaceLocator, LocatorProvider};
use crate::store::EnrollmentStore;
use crate::trainer::FaceTrainer;
use crate::types::{AcceptedFace, Photo, ValidationReport};
use image::GrayImage;

/// Accepted batch size range, inclusive.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub min_photos: usize,
    pub max_photos: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self { min_photos: 5, max_photos: 8 }
    }
}

/// Orchestrates one enrollment request end to end.
///
/// The locator, trainer and store are injected seams; the pipeline owns the
/// sequencing and the error-collection policy, nothing else.
pub struct EnrollmentPipeline<P, T, S> {
    locator: P,
    trainer: T,
    store: S,
    limits: BatchLimits,
    checker: DistinctnessChecker,
}

impl<P, T, S> EnrollmentPipeline<P, T, S>
where
    P: LocatorProvider,
    T: FaceTrainer,
    S: EnrollmentStore,
{
    pub fn new(locator: P, trainer: T, store: S) -> Self {
        Self::with_policy(locator, trainer, store, BatchLimits::default(), DistinctnessChecker::default())
    }

    pub fn with_policy(
        locator: P,
        trainer: T,
        store: S,
        limits: BatchLimits,
        checker: DistinctnessChecker,
    ) -> Self {
        Self { locator, trainer, store, limits, checker }
    }

    /// Validate a photo batch for `subject`; persist and train when any faces
    /// survive. Always returns a report, never an error, for the enumerated
    /// failure modes.
    pub fn enroll(&mut self, subject: &str, photos: &[Photo]) -> ValidationReport {
        // Stage 1 — count gate. Hard: nothing downstream runs out of range.
        if photos.len() < self.limits.min_photos {
            return ValidationReport::fatal(format!(
                "at least {} photos are required",
                self.limits.min_photos
            ));
        }
        if photos.len() > self.limits.max_photos {
            return ValidationReport::fatal(format!(
                "at most {} photos are allowed",
                self.limits.max_photos
            ));
        }

        // Stage 2 — detector availability. Fatal for the batch, not per photo.
        let locator = match self.locator.acquire() {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(subject, error = %e, "face detector unavailable");
                return ValidationReport::fatal(format!("face detector unavailable: {e}"));
            }
        };

        let mut errors = Vec::new();
        let mut accepted = Vec::new();

        // Stage 3 — per photo, order-preserving, one outcome each. A photo's
        // failure never stops the rest of the batch.
        for (index, photo) in photos.iter().enumerate() {
            let name = photo.effective_name(index);
            match validate_photo(locator, photo, &name) {
                Ok(face) => accepted.push(face),
                Err(message) => errors.push(message),
            }
        }

        // Stage 4 — distinctness among accepted faces, submission order in,
        // survivor order out.
        if accepted.len() >= 2 {
            let (kept, duplicate_errors) = self.checker.filter_distinct(accepted);
            accepted = kept;
            errors.extend(duplicate_errors);
        }

        let valid_file_names: Vec<String> =
            accepted.iter().map(|f| f.file_name.clone()).collect();

        // Stage 5 — commit. Any failure collapses to a single error entry;
        // files already written stay written.
        if accepted.is_empty() {
            errors.push("not enough valid photos to train the model".to_string());
        } else if let Err(e) = self.commit(subject, &accepted) {
            errors.push(format!("failed to save images or train model: {e}"));
        }

        tracing::info!(
            subject,
            submitted = photos.len(),
            accepted = valid_file_names.len(),
            errors = errors.len(),
            "enrollment processed"
        );

        ValidationReport { valid_file_names, errors }
    }

    fn commit(&mut self, subject: &str, faces: &[AcceptedFace]) -> Result<(), String> {
        self.store
            .save_images(subject, faces)
            .map_err(|e| e.to_string())?;
        let model = self
            .trainer
            .train(subject, faces)
            .map_err(|e| e.to_string())?;
        self.store
            .save_model(subject, &model)
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Stage-3 validation of one photo: decode, normalize, detect, enforce a
/// single non-degenerate face. Returns the rejection message on failure.
fn validate_photo(
    locator: &mut dyn FaceLocator,
    photo: &Photo,
    name: &str,
) -> Result<AcceptedFace, String> {
    let source = image::load_from_memory(&photo.bytes)
        .map_err(|_| format!("could not read image: {name}"))?;

    // Detection input prep: single-channel intensity plus contrast
    // normalization, always applied.
    let gray = source.to_luma8();
    let equalized = imageproc::contrast::equalize_histogram(&gray);

    let boxes = locator
        .locate(&equalized)
        .map_err(|e| format!("error processing image {name}: {e}"))?;

    // A box that clamps to nothing is no detection at all.
    let regions: Vec<_> = boxes
        .iter()
        .filter_map(|b| b.clamp_to(equalized.width(), equalized.height()))
        .collect();

    match regions.as_slice() {
        [] => Err(format!("no face detected in: {name}")),
        [region] => {
            let crop: GrayImage = image::imageops::crop_imm(
                &equalized,
                region.x,
                region.y,
                region.width,
                region.height,
            )
            .to_image();
            Ok(AcceptedFace { file_name: name.to_string(), source, crop })
        }
        _ => Err(format!("multiple faces detected in: {name}")),
    }
}
