//! External OCR program backend
//!
//! Runs an OCR program (typically a small PaddleOCR wrapper script) on a
//! temporary PNG and reads PaddleOCR-format JSON from its stdout.

use crossbeam_channel::{bounded, Receiver};
use image::RgbImage;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ocr::{parse_paddle_json, OcrAdapter, OcrError};
use super::Detection;
use crate::config::OcrConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace period for collecting output after the program exited
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// OCR adapter that shells out to an external program
pub struct CommandOcr {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandOcr {
    /// Create an adapter for `program`; the image path is appended after `args`
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from config, if an OCR command is configured
    pub fn from_config(config: &OcrConfig) -> Option<Self> {
        let program = config.command.as_ref()?;
        info!("Using external OCR command: {} {:?}", program, config.args);
        Some(Self::new(
            program.clone(),
            config.args.clone(),
            Duration::from_millis(config.timeout_ms),
        ))
    }

    fn run(&self, input: &Path) -> Result<String, OcrError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OcrError::Unavailable(format!("failed to start '{}': {e}", self.program)))?;

        // Drain both pipes on their own threads so a chatty engine cannot
        // block on a full pipe while we wait for it.
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    warn!("OCR command '{}' exceeded {:?}, killing it", self.program, self.timeout);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(OcrError::Timeout(self.timeout));
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(OcrError::Unavailable(format!("failed waiting for '{}': {e}", self.program)));
                }
            }
        };

        let stdout = collect(stdout);
        if !status.success() {
            let stderr = collect(stderr);
            return Err(OcrError::Unavailable(format!(
                "'{}' exited with {}: {}",
                self.program,
                status,
                stderr.trim()
            )));
        }

        Ok(stdout)
    }
}

impl OcrAdapter for CommandOcr {
    fn name(&self) -> &str {
        &self.program
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, OcrError> {
        let input = TempImage::write(image)?;
        debug!("Running OCR command '{}' on {:?}", self.program, input.path());

        let output = self.run(input.path())?;
        parse_paddle_json(&output)
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> Receiver<String> {
    let (tx, rx) = bounded(1);
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

fn collect(reader: Option<Receiver<String>>) -> String {
    reader
        .and_then(|rx| rx.recv_timeout(OUTPUT_GRACE).ok())
        .unwrap_or_default()
}

/// PNG in the temp directory, removed on drop
struct TempImage {
    path: PathBuf,
}

impl TempImage {
    fn write(image: &RgbImage) -> Result<Self, OcrError> {
        let path = std::env::temp_dir().join(format!("stamp-verify-ocr-{}.png", Uuid::new_v4().simple()));
        image
            .save(&path)
            .map_err(|e| OcrError::Unavailable(format!("failed to write OCR input {:?}: {e}", path)))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str, timeout_ms: u64) -> CommandOcr {
        // `sh -c script name image_path`: the image path lands in $1
        CommandOcr::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "ocr".to_string()],
            Duration::from_millis(timeout_ms),
        )
    }

    #[test]
    fn test_reads_detections_from_stdout() {
        let ocr = shell(
            r#"test -f "$1" && echo '[[[[0,0],[10,0],[10,5],[0,5]],["LOT 44B",0.9]]]'"#,
            5_000,
        );
        let detections = ocr.detect(&RgbImage::new(8, 8)).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text, "LOT 44B");
    }

    #[test]
    fn test_empty_output_list() {
        let ocr = shell("echo '[null]'", 5_000);
        assert!(ocr.detect(&RgbImage::new(2, 2)).unwrap().is_empty());
    }

    #[test]
    fn test_timeout() {
        let ocr = shell("sleep 5", 100);
        let start = Instant::now();
        let err = ocr.detect(&RgbImage::new(2, 2)).unwrap_err();
        assert_eq!(err, OcrError::Timeout(Duration::from_millis(100)));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let ocr = CommandOcr::new("/nonexistent/ocr-engine", vec![], Duration::from_secs(1));
        assert!(matches!(ocr.detect(&RgbImage::new(2, 2)), Err(OcrError::Unavailable(_))));
    }

    #[test]
    fn test_nonzero_exit_is_unavailable() {
        let ocr = shell("echo 'model not found' >&2; exit 3", 5_000);
        match ocr.detect(&RgbImage::new(2, 2)) {
            Err(OcrError::Unavailable(msg)) => assert!(msg.contains("model not found")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_temp_image_removed() {
        let ocr = shell(r#"echo "$1" >&2; exit 1"#, 5_000);
        let Err(OcrError::Unavailable(msg)) = ocr.detect(&RgbImage::new(2, 2)) else {
            panic!("expected failure");
        };
        let path = msg.rsplit(": ").next().unwrap().trim();
        assert!(!Path::new(path).exists());
    }

    #[test]
    fn test_from_config() {
        let mut config = OcrConfig::default();
        assert!(CommandOcr::from_config(&config).is_none());

        config.command = Some("paddle-json".to_string());
        config.timeout_ms = 1_500;
        let ocr = CommandOcr::from_config(&config).unwrap();
        assert_eq!(ocr.name(), "paddle-json");
        assert_eq!(ocr.timeout, Duration::from_millis(1_500));
    }
}
