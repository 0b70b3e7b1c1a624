//! Check Session Coordinator
//!
//! Owns one verification pipeline and, for live sources, the capture state
//! machine. Recognition freezes the display, runs OCR on the frozen frame
//! outside the capture lock, and keeps the detections for role selection
//! until the next resume.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::capture::{CaptureSession, CaptureState, CapturedFrame, FreezeOutcome, ResumeOutcome};
use crate::pipeline::{Verification, VerificationError, VerificationPipeline};
use crate::vision::Detection;

/// Frame and detections from the last recognition
#[derive(Debug, Clone)]
pub struct Recognition {
    pub frame: CapturedFrame,
    pub detections: Vec<Detection>,
}

/// Result of a recognition request
#[derive(Debug, Clone)]
pub enum RecognitionOutcome {
    /// OCR ran on the frozen frame
    Recognized(Recognition),
    /// Already frozen; resume first
    Ignored,
    /// No frame has been displayed yet
    NoFrame,
}

/// One operator's verification session
pub struct CheckSession {
    pipeline: VerificationPipeline,
    capture: Arc<CaptureSession>,
    recognition: Mutex<Option<Recognition>>,
}

impl CheckSession {
    pub fn new(pipeline: VerificationPipeline) -> Self {
        Self {
            pipeline,
            capture: Arc::new(CaptureSession::new()),
            recognition: Mutex::new(None),
        }
    }

    pub fn pipeline(&self) -> &VerificationPipeline {
        &self.pipeline
    }

    /// Shared handle to the capture state, for frame producers
    pub fn capture(&self) -> Arc<CaptureSession> {
        self.capture.clone()
    }

    pub fn state(&self) -> CaptureState {
        self.capture.state()
    }

    /// Offer a live frame; ignored while frozen
    pub fn on_frame(&self, frame: CapturedFrame) -> bool {
        self.capture.on_frame(frame)
    }

    /// Freeze on the displayed frame and run OCR on it.
    ///
    /// The session stays frozen whatever the OCR outcome; only
    /// [`CheckSession::resume`] returns it to live.
    pub fn request_recognition(&self) -> Result<RecognitionOutcome, VerificationError> {
        let frame = match self.capture.freeze() {
            FreezeOutcome::Frozen(frame) => frame,
            FreezeOutcome::AlreadyFrozen => return Ok(RecognitionOutcome::Ignored),
            FreezeOutcome::NoFrame => return Ok(RecognitionOutcome::NoFrame),
        };

        info!("Recognizing frame #{}", frame.sequence);
        let detected = self.pipeline.detect(&frame.image);
        self.capture.finish_recognition();

        let recognition = Recognition {
            frame,
            detections: detected?,
        };
        *self.recognition.lock() = Some(recognition.clone());
        Ok(RecognitionOutcome::Recognized(recognition))
    }

    /// Detections from the current frozen frame, if any
    pub fn recognition(&self) -> Option<Recognition> {
        self.recognition.lock().clone()
    }

    /// Return to live. Drops the detections of the frozen frame.
    pub fn resume(&self) -> ResumeOutcome {
        let outcome = self.capture.resume();
        if outcome == ResumeOutcome::Resumed {
            self.recognition.lock().take();
            debug!("Resumed live display");
        }
        outcome
    }

    /// Verify two detections of the last recognition.
    ///
    /// Without a recognition there is nothing to select from, which is
    /// reported as [`VerificationError::NoDetections`].
    pub fn run_verification(&self, reference: usize, sample: usize) -> Result<Verification, VerificationError> {
        let Some(recognition) = self.recognition() else {
            return Err(VerificationError::NoDetections);
        };

        self.pipeline
            .run_verification(&recognition.frame.image, &recognition.detections, reference, sample)
    }

    /// Persist a verification; see [`VerificationPipeline::commit`]
    pub fn commit(&self, verification: &Verification) -> Result<(), VerificationError> {
        self.pipeline.commit(verification)
    }
}
