//! Interactive live mode
//!
//! Frames from a source thread and operator commands from stdin are
//! multiplexed on one thread, so frame delivery and recognition requests
//! never run concurrently against the session.

use anyhow::Result;
use crossbeam_channel::{never, select, unbounded, Receiver};
use std::io::BufRead;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::app::{CheckSession, RecognitionOutcome};
use crate::capture::{spawn_source, CapturedFrame, FrameSource, ResumeOutcome};
use crate::pipeline::{Verification, VerificationError};
use crate::report;

/// One line typed by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveCommand {
    Recognize,
    Verify { reference: usize, sample: usize },
    /// Commit the last verification whose commit failed
    Retry,
    Resume,
    Status,
    Help,
    Quit,
}

impl FromStr for LiveCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let Some(word) = parts.next() else {
            return Err("empty command".to_string());
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "recognize" | "r" => LiveCommand::Recognize,
            "verify" | "v" => {
                let mut index = |name: &str| -> Result<usize, String> {
                    let raw = parts.next().ok_or_else(|| format!("verify needs a {name} index"))?;
                    raw.parse().map_err(|_| format!("'{raw}' is not a valid {name} index"))
                };
                let reference = index("reference")?;
                let sample = index("sample")?;
                LiveCommand::Verify { reference, sample }
            }
            "retry" => LiveCommand::Retry,
            "resume" | "live" => LiveCommand::Resume,
            "status" | "s" => LiveCommand::Status,
            "help" | "?" => LiveCommand::Help,
            "quit" | "exit" | "q" => LiveCommand::Quit,
            other => return Err(format!("unknown command '{other}', type 'help'")),
        };

        if let Some(extra) = parts.next() {
            return Err(format!("unexpected argument '{extra}'"));
        }
        Ok(command)
    }
}

const HELP: &str = "\
Commands:
  recognize (r)        freeze the current frame and run OCR on it
  verify (v) REF SMP   compare detection REF against detection SMP and save
  retry                save the last verification again after a failed save
  resume               return to the live picture
  status (s)           show session state
  help (?)             show this help
  quit (q)             leave live mode";

enum Event {
    Frame(Option<CapturedFrame>),
    Line(Option<String>),
}

/// Read stdin lines on a background thread. The channel closes at EOF.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
        debug!("stdin closed");
    });
    rx
}

/// Run the live loop until `quit` or end of input
pub fn run_live(session: &CheckSession, source: Box<dyn FrameSource>, channel_capacity: usize) -> Result<()> {
    let (frames, mut handle) = spawn_source(source, channel_capacity);
    let commands = spawn_stdin_reader();
    let no_frames = never();
    let mut frames_open = true;
    let mut pending: Option<Verification> = None;

    println!("{HELP}");

    loop {
        let frame_rx = if frames_open { &frames } else { &no_frames };

        let event = select! {
            recv(frame_rx) -> frame => Event::Frame(frame.ok()),
            recv(commands) -> line => Event::Line(line.ok()),
        };

        match event {
            Event::Frame(Some(frame)) => {
                session.on_frame(frame);
            }
            Event::Frame(None) => {
                info!("Frame source stopped, commands are still accepted");
                frames_open = false;
            }
            // end of input
            Event::Line(None) => break,
            Event::Line(Some(line)) if line.trim().is_empty() => {}
            Event::Line(Some(line)) => match line.parse::<LiveCommand>() {
                Ok(LiveCommand::Quit) => break,
                Ok(command) => handle_command(session, command, &mut pending),
                Err(e) => println!("{e}"),
            },
        }
    }

    handle.stop();
    let stats = session.capture().stats();
    info!("Live mode finished ({} frames shown, {} discarded)", stats.shown, stats.discarded);
    Ok(())
}

fn handle_command(session: &CheckSession, command: LiveCommand, pending: &mut Option<Verification>) {
    match command {
        LiveCommand::Recognize => match session.request_recognition() {
            Ok(RecognitionOutcome::Recognized(recognition)) => {
                report::print_detections(&recognition.detections);
                println!("Frozen. Pick regions with 'verify REF SMP' or 'resume'.");
            }
            Ok(RecognitionOutcome::Ignored) => println!("Already frozen, 'resume' first."),
            Ok(RecognitionOutcome::NoFrame) => println!("No frame received yet."),
            Err(e) => {
                report::print_error(&e);
                println!("Still frozen, 'resume' to continue.");
            }
        },
        LiveCommand::Verify { reference, sample } => match session.run_verification(reference, sample) {
            Ok(verification) => {
                report::print_verification(&verification);
                commit(session, verification, pending);
            }
            Err(e) => report::print_error(&e),
        },
        LiveCommand::Retry => match pending.take() {
            Some(verification) => commit(session, verification, pending),
            None => println!("Nothing to retry."),
        },
        LiveCommand::Resume => match session.resume() {
            ResumeOutcome::Resumed => println!("Live."),
            ResumeOutcome::NotFrozen => println!("Already live."),
            ResumeOutcome::RecognitionInFlight => println!("Recognition still running, try again shortly."),
        },
        LiveCommand::Status => print_status(session, pending.is_some()),
        LiveCommand::Help => println!("{HELP}"),
        LiveCommand::Quit => {}
    }
}

fn commit(session: &CheckSession, verification: Verification, pending: &mut Option<Verification>) {
    match session.commit(&verification) {
        Ok(()) => println!("Saved to {}", verification.record.image_path().display()),
        Err(e) => {
            report::print_error(&e);
            if let VerificationError::PersistenceFailure { verification, .. } = e {
                warn!("Verification kept for retry");
                *pending = Some(*verification);
                println!("Type 'retry' to save it again.");
            }
        }
    }
}

fn print_status(session: &CheckSession, has_pending: bool) {
    let capture = session.capture();
    let stats = capture.stats();

    if capture.is_recognizing() {
        println!("State:        {} (recognizing)", session.state());
    } else {
        println!("State:        {}", session.state());
    }
    match capture.displayed_frame() {
        Some(frame) => {
            let (w, h) = frame.dimensions();
            println!("Frame:        #{} ({}x{})", frame.sequence, w, h);
        }
        None => println!("Frame:        none"),
    }
    println!("Frames:       {} shown, {} discarded", stats.shown, stats.discarded);
    if let Some(recognition) = session.recognition() {
        println!("Detections:   {}", recognition.detections.len());
    }
    match session.pipeline().history().count() {
        Ok(count) => println!("History:      {} records", count),
        Err(e) => println!("History:      unavailable ({e:#})"),
    }
    if has_pending {
        println!("Unsaved verification waiting for 'retry'");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::VerificationPipeline;
    use crate::storage::{HistoryStore, ImageStore, MemoryHistory};
    use crate::verification::Comparator;
    use crate::vision::{Annotator, Detection, ReplayOcr, VisionConfig, VisionPipeline};
    use image::{Rgb, RgbImage};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn session(history: &MemoryHistory, dir: &TempDir) -> CheckSession {
        let ocr = ReplayOcr::new(vec![
            Detection::rect(4.0, 10.0, 50.0, 14.0, "LOT 44B", 0.9),
            Detection::rect(4.0, 40.0, 50.0, 14.0, "LOT44B!", 0.9),
        ]);
        CheckSession::new(VerificationPipeline::new(
            VisionPipeline::new(Box::new(ocr), VisionConfig::default()),
            Comparator::new(),
            Annotator::without_font(1, 12.0),
            ImageStore::new(dir.path().join("images")),
            Box::new(history.clone()),
        ))
    }

    fn show_frame(session: &CheckSession) {
        let image = Arc::new(RgbImage::from_pixel(64, 64, Rgb([240, 240, 240])));
        session.on_frame(CapturedFrame::new(image, 1));
    }

    #[test]
    fn test_retry_after_failed_save() {
        let dir = tempdir().unwrap();
        let history = MemoryHistory::broken();
        let session = session(&history, &dir);
        let mut pending = None;

        show_frame(&session);
        handle_command(&session, LiveCommand::Recognize, &mut pending);
        handle_command(&session, LiveCommand::Verify { reference: 0, sample: 1 }, &mut pending);
        assert!(pending.is_some());
        assert_eq!(history.count().unwrap(), 0);

        // still failing: the verification stays queued
        handle_command(&session, LiveCommand::Retry, &mut pending);
        assert!(pending.is_some());

        history.set_broken(false);
        handle_command(&session, LiveCommand::Retry, &mut pending);
        assert!(pending.is_none());
        assert_eq!(history.count().unwrap(), 1);
        assert_eq!(history.recent(1).unwrap()[0].sample_text(), "LOT44B!");
    }

    #[test]
    fn test_verify_saves_directly_when_store_works() {
        let dir = tempdir().unwrap();
        let history = MemoryHistory::default();
        let session = session(&history, &dir);
        let mut pending = None;

        show_frame(&session);
        handle_command(&session, LiveCommand::Recognize, &mut pending);
        handle_command(&session, LiveCommand::Verify { reference: 0, sample: 1 }, &mut pending);
        assert!(pending.is_none());
        assert_eq!(history.count().unwrap(), 1);

        handle_command(&session, LiveCommand::Retry, &mut pending);
        assert_eq!(history.count().unwrap(), 1);
    }

    #[test]
    fn test_verify_before_recognition_keeps_nothing() {
        let dir = tempdir().unwrap();
        let history = MemoryHistory::default();
        let session = session(&history, &dir);
        let mut pending = None;

        handle_command(&session, LiveCommand::Verify { reference: 0, sample: 1 }, &mut pending);
        assert!(pending.is_none());
        assert_eq!(history.count().unwrap(), 0);

        handle_command(&session, LiveCommand::Resume, &mut pending);
        handle_command(&session, LiveCommand::Status, &mut pending);
        assert_eq!(session.state(), crate::capture::CaptureState::Live);
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!("recognize".parse::<LiveCommand>(), Ok(LiveCommand::Recognize));
        assert_eq!("R".parse::<LiveCommand>(), Ok(LiveCommand::Recognize));
        assert_eq!("  resume ".parse::<LiveCommand>(), Ok(LiveCommand::Resume));
        assert_eq!("status".parse::<LiveCommand>(), Ok(LiveCommand::Status));
        assert_eq!("retry".parse::<LiveCommand>(), Ok(LiveCommand::Retry));
        assert_eq!("q".parse::<LiveCommand>(), Ok(LiveCommand::Quit));
        assert_eq!("exit".parse::<LiveCommand>(), Ok(LiveCommand::Quit));
    }

    #[test]
    fn test_parse_verify() {
        assert_eq!(
            "verify 0 1".parse::<LiveCommand>(),
            Ok(LiveCommand::Verify { reference: 0, sample: 1 })
        );
        assert_eq!(
            "v 2 2".parse::<LiveCommand>(),
            Ok(LiveCommand::Verify { reference: 2, sample: 2 })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<LiveCommand>().is_err());
        assert!("verify".parse::<LiveCommand>().is_err());
        assert!("verify 1".parse::<LiveCommand>().is_err());
        assert!("verify a 1".parse::<LiveCommand>().unwrap_err().contains("'a'"));
        assert!("verify -1 0".parse::<LiveCommand>().is_err());
        assert!("resume now".parse::<LiveCommand>().is_err());
        assert!("dance".parse::<LiveCommand>().unwrap_err().contains("dance"));
    }
}
