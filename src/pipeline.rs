//! Verification Orchestrator
//!
//! Ties OCR, role assignment, comparison, annotation and persistence into
//! one verification attempt.

use chrono::Local;
use image::RgbImage;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::storage::{HistoryStore, ImageStore};
use crate::verification::{Comparator, RoleAssignment, SelectionError, VerificationRecord, VerificationResult};
use crate::vision::{Annotator, Detection, OcrError, VisionPipeline};

/// Why a verification attempt did not complete
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("OCR engine timed out after {0:?}")]
    EngineTimeout(Duration),
    #[error("no text detected in the image")]
    NoDetections,
    #[error("invalid selection: {0}")]
    InvalidSelection(#[from] SelectionError),
    /// The comparison finished but could not be stored. The verification is
    /// kept so it can be committed again.
    #[error("failed to persist verification: {reason}")]
    PersistenceFailure {
        reason: String,
        verification: Box<Verification>,
    },
}

impl From<OcrError> for VerificationError {
    fn from(err: OcrError) -> Self {
        match err {
            OcrError::Unavailable(msg) => Self::EngineUnavailable(msg),
            OcrError::Timeout(after) => Self::EngineTimeout(after),
        }
    }
}

impl VerificationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EngineUnavailable(_) => ErrorCategory::EngineUnavailable,
            Self::EngineTimeout(_) => ErrorCategory::EngineTimeout,
            Self::NoDetections => ErrorCategory::NoDetections,
            Self::InvalidSelection(_) => ErrorCategory::InvalidSelection,
            Self::PersistenceFailure { .. } => ErrorCategory::PersistenceFailure,
        }
    }

    /// The computed verification, if the error happened after comparison
    pub fn verification(&self) -> Option<&Verification> {
        match self {
            Self::PersistenceFailure { verification, .. } => Some(verification.as_ref()),
            _ => None,
        }
    }
}

/// User-facing grouping of verification errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    EngineUnavailable,
    EngineTimeout,
    NoDetections,
    InvalidSelection,
    PersistenceFailure,
}

impl ErrorCategory {
    /// Message suitable for showing to an operator
    pub fn message(&self) -> &'static str {
        match self {
            Self::EngineUnavailable => "The OCR engine could not be reached. Check the OCR command and try again.",
            Self::EngineTimeout => "The OCR engine took too long to answer. Try again or raise the timeout.",
            Self::NoDetections => "No text was found in the image. Adjust the camera and retake the picture.",
            Self::InvalidSelection => "The selected regions do not exist. Pick a reference and a sample from the list.",
            Self::PersistenceFailure => "The result could not be saved. It is kept and can be saved again.",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A completed comparison, ready to be committed
#[derive(Clone)]
pub struct Verification {
    pub result: VerificationResult,
    pub record: VerificationRecord,
    /// Copy of the source image with all detections drawn in
    pub annotated: RgbImage,
    pub roles: RoleAssignment,
}

impl fmt::Debug for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verification")
            .field("result", &self.result)
            .field("record", &self.record)
            .field("annotated", &self.annotated.dimensions())
            .field("roles", &self.roles)
            .finish()
    }
}

/// Runs verification attempts against one OCR engine and one history
pub struct VerificationPipeline {
    vision: VisionPipeline,
    comparator: Comparator,
    annotator: Annotator,
    images: ImageStore,
    history: Box<dyn HistoryStore>,
}

impl VerificationPipeline {
    pub fn new(
        vision: VisionPipeline,
        comparator: Comparator,
        annotator: Annotator,
        images: ImageStore,
        history: Box<dyn HistoryStore>,
    ) -> Self {
        Self {
            vision,
            comparator,
            annotator,
            images,
            history,
        }
    }

    /// Run OCR on `image`. Blocking; engine errors are returned as-is,
    /// never retried.
    pub fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, VerificationError> {
        let result = self.vision.process(image)?;
        info!(
            "Detected {} text regions in {} ms ({} below confidence floor)",
            result.detections.len(),
            result.processing_time_ms,
            result.filtered
        );
        Ok(result.detections)
    }

    /// Compare the detections at `reference` and `sample`.
    ///
    /// The same index may be given for both. Nothing is persisted here; see
    /// [`VerificationPipeline::commit`].
    pub fn run_verification(
        &self,
        image: &RgbImage,
        detections: &[Detection],
        reference: usize,
        sample: usize,
    ) -> Result<Verification, VerificationError> {
        if detections.is_empty() {
            return Err(VerificationError::NoDetections);
        }

        let roles = RoleAssignment::pair(reference, sample, detections.len())?;
        let (reference, sample) = roles.complete()?;
        let reference_text = &detections[reference].text;
        let sample_text = &detections[sample].text;

        let result = self.comparator.compare(reference_text, sample_text);

        let annotated = self.annotator.annotate(
            image,
            detections.iter().enumerate().map(|(i, d)| (d, roles.role_of(i))),
        );

        let timestamp = Local::now();
        let record = VerificationRecord::new(
            self.images.resolve_path(timestamp),
            reference_text.as_str(),
            sample_text.as_str(),
            result,
            timestamp,
        );

        info!(
            "Verification {}: {:?} vs {:?}, similarity {:.3}",
            result.verdict, reference_text, sample_text, result.similarity
        );

        Ok(Verification {
            result,
            record,
            annotated,
            roles,
        })
    }

    /// Write the annotated image, then append the record to history.
    ///
    /// The record is not appended when the image write fails. On failure the
    /// error carries the verification so the caller can retry.
    pub fn commit(&self, verification: &Verification) -> Result<(), VerificationError> {
        let path = verification.record.image_path();
        let record = &verification.record;

        match self
            .history
            .contains(record.reference_text(), record.sample_text(), record.verdict())
        {
            Ok(true) => warn!(
                "Identical check already in history: {:?} vs {:?} ({})",
                record.reference_text(),
                record.sample_text(),
                record.verdict()
            ),
            Ok(false) => {}
            Err(e) => debug!("Duplicate lookup failed: {:#}", e),
        }

        let stored = self
            .images
            .save(&verification.annotated, path)
            .and_then(|()| self.history.append(&verification.record));

        if let Err(e) = stored {
            error!("Failed to persist verification for {:?}: {:#}", path, e);
            return Err(VerificationError::PersistenceFailure {
                reason: format!("{e:#}"),
                verification: Box::new(verification.clone()),
            });
        }

        info!("Verification saved to {:?}", path);
        Ok(())
    }

    pub fn history(&self) -> &dyn HistoryStore {
        self.history.as_ref()
    }

    pub fn comparator(&self) -> &Comparator {
        &self.comparator
    }
}
