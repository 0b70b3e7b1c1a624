//! Live Capture Layer
//!
//! Holds the frame currently on display and the Live/Frozen state that
//! gates recognition. Both live behind one lock so a frame update never
//! interleaves with a state change.

pub mod frame;
pub mod source;

pub use frame::CapturedFrame;
pub use source::{spawn_source, FrameSource, ReplaySource, SourceHandle};

use parking_lot::Mutex;
use std::fmt;
use tracing::debug;

/// Display state of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    /// New frames replace the displayed one
    #[default]
    Live,
    /// One frame is held; incoming frames are discarded
    Frozen,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureState::Live => f.write_str("live"),
            CaptureState::Frozen => f.write_str("frozen"),
        }
    }
}

/// Outcome of a recognition request
#[derive(Debug, Clone)]
pub enum FreezeOutcome {
    /// The session froze on this frame; recognition should run on it
    Frozen(CapturedFrame),
    /// Already frozen, nothing changed
    AlreadyFrozen,
    /// Live, but no frame has arrived yet
    NoFrame,
}

/// Outcome of a resume request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed,
    NotFrozen,
    /// Recognition on the frozen frame has not returned yet
    RecognitionInFlight,
}

/// Frame counters for a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Frames that became the displayed frame
    pub shown: u64,
    /// Frames discarded while frozen
    pub discarded: u64,
}

#[derive(Default)]
struct Inner {
    state: CaptureState,
    displayed: Option<CapturedFrame>,
    recognition_in_flight: bool,
    stats: CaptureStats,
}

/// Live/Frozen state machine around the displayed frame
#[derive(Default)]
pub struct CaptureSession {
    inner: Mutex<Inner>,
}

impl CaptureSession {
    /// Session starting in `Live` with nothing displayed
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a new frame. Returns false if it was discarded because the
    /// session is frozen.
    pub fn on_frame(&self, frame: CapturedFrame) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CaptureState::Live => {
                inner.displayed = Some(frame);
                inner.stats.shown += 1;
                true
            }
            CaptureState::Frozen => {
                inner.stats.discarded += 1;
                false
            }
        }
    }

    /// Freeze on the displayed frame and mark recognition as in flight
    pub fn freeze(&self) -> FreezeOutcome {
        let mut inner = self.inner.lock();
        if inner.state == CaptureState::Frozen {
            debug!("Recognition requested while frozen, ignoring");
            return FreezeOutcome::AlreadyFrozen;
        }

        let Some(frame) = inner.displayed.clone() else {
            debug!("Recognition requested before the first frame, ignoring");
            return FreezeOutcome::NoFrame;
        };

        inner.state = CaptureState::Frozen;
        inner.recognition_in_flight = true;
        debug!("Frozen on frame #{}", frame.sequence);
        FreezeOutcome::Frozen(frame)
    }

    /// Mark the recognition started by `freeze` as returned
    pub fn finish_recognition(&self) {
        self.inner.lock().recognition_in_flight = false;
    }

    /// Return to `Live`. Refused while recognition is still running.
    pub fn resume(&self) -> ResumeOutcome {
        let mut inner = self.inner.lock();
        match inner.state {
            CaptureState::Live => ResumeOutcome::NotFrozen,
            CaptureState::Frozen if inner.recognition_in_flight => {
                debug!("Resume refused, recognition still in flight");
                ResumeOutcome::RecognitionInFlight
            }
            CaptureState::Frozen => {
                inner.state = CaptureState::Live;
                ResumeOutcome::Resumed
            }
        }
    }

    pub fn state(&self) -> CaptureState {
        self.inner.lock().state
    }

    /// The frame currently on display
    pub fn displayed_frame(&self) -> Option<CapturedFrame> {
        self.inner.lock().displayed.clone()
    }

    pub fn is_recognizing(&self) -> bool {
        self.inner.lock().recognition_in_flight
    }

    pub fn stats(&self) -> CaptureStats {
        self.inner.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::Arc;

    fn frame(sequence: u64) -> CapturedFrame {
        CapturedFrame::new(Arc::new(RgbImage::new(4, 4)), sequence)
    }

    fn displayed_sequence(session: &CaptureSession) -> Option<u64> {
        session.displayed_frame().map(|f| f.sequence)
    }

    #[test]
    fn test_live_frames_replace_display() {
        let session = CaptureSession::new();
        assert_eq!(session.state(), CaptureState::Live);
        assert!(session.displayed_frame().is_none());

        assert!(session.on_frame(frame(1)));
        assert!(session.on_frame(frame(2)));
        assert_eq!(displayed_sequence(&session), Some(2));
        assert_eq!(session.stats().shown, 2);
    }

    #[test]
    fn test_freeze_without_frame() {
        let session = CaptureSession::new();
        assert!(matches!(session.freeze(), FreezeOutcome::NoFrame));
        assert_eq!(session.state(), CaptureState::Live);
    }

    #[test]
    fn test_frozen_discards_frames_until_resume() {
        let session = CaptureSession::new();
        session.on_frame(frame(1));

        let FreezeOutcome::Frozen(frozen) = session.freeze() else {
            panic!("expected to freeze");
        };
        assert_eq!(frozen.sequence, 1);
        assert_eq!(session.state(), CaptureState::Frozen);

        assert!(!session.on_frame(frame(2)));
        assert!(!session.on_frame(frame(3)));
        assert_eq!(displayed_sequence(&session), Some(1));
        assert_eq!(session.stats().discarded, 2);

        session.finish_recognition();
        assert_eq!(session.resume(), ResumeOutcome::Resumed);
        assert_eq!(session.state(), CaptureState::Live);

        // discarded frames were not queued
        assert_eq!(displayed_sequence(&session), Some(1));
        assert!(session.on_frame(frame(4)));
        assert_eq!(displayed_sequence(&session), Some(4));
    }

    #[test]
    fn test_second_recognition_request_is_noop() {
        let session = CaptureSession::new();
        session.on_frame(frame(1));
        assert!(matches!(session.freeze(), FreezeOutcome::Frozen(_)));
        assert!(matches!(session.freeze(), FreezeOutcome::AlreadyFrozen));
        assert_eq!(session.state(), CaptureState::Frozen);
    }

    #[test]
    fn test_resume_refused_during_recognition() {
        let session = CaptureSession::new();
        session.on_frame(frame(1));
        session.freeze();

        assert!(session.is_recognizing());
        assert_eq!(session.resume(), ResumeOutcome::RecognitionInFlight);
        assert_eq!(session.state(), CaptureState::Frozen);

        session.finish_recognition();
        assert_eq!(session.resume(), ResumeOutcome::Resumed);
    }

    #[test]
    fn test_resume_when_live() {
        let session = CaptureSession::new();
        assert_eq!(session.resume(), ResumeOutcome::NotFrozen);
    }

    #[test]
    fn test_concurrent_frames_during_freeze() {
        let session = Arc::new(CaptureSession::new());
        session.on_frame(frame(0));
        session.freeze();

        let producer = {
            let session = session.clone();
            std::thread::spawn(move || (1..=100).filter(|i| session.on_frame(frame(*i))).count())
        };

        assert_eq!(producer.join().unwrap(), 0);
        assert_eq!(displayed_sequence(&session), Some(0));
        assert_eq!(session.stats().discarded, 100);
    }
}
