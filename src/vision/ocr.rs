//! OCR adapter boundary
//!
//! The OCR engine itself is external. Adapters hand back detections in the
//! order the engine reported them; the PaddleOCR result layout
//! (`[[[x, y], ...], ["text", confidence]]` per line) is the wire format.

use anyhow::Context;
use image::RgbImage;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::Detection;

/// Failures of an OCR engine call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OcrError {
    /// The engine could not be reached, crashed, or produced unusable output
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),
    /// The engine did not answer within the allowed time
    #[error("OCR engine timed out after {0:?}")]
    Timeout(Duration),
}

/// Text detection and recognition engine
pub trait OcrAdapter: Send + Sync {
    /// Short engine name for logs
    fn name(&self) -> &str;

    /// Detect text regions in `image`. May block for a long time.
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, OcrError>;
}

/// Adapter that returns a fixed, precomputed set of detections.
///
/// Used for static images whose OCR output was produced ahead of time.
pub struct ReplayOcr {
    detections: Vec<Detection>,
}

impl ReplayOcr {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    /// Load PaddleOCR-format JSON from a file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read OCR results {:?}", path))?;
        let detections = parse_paddle_json(&raw)
            .with_context(|| format!("Failed to parse OCR results {:?}", path))?;
        debug!("Loaded {} precomputed detections from {:?}", detections.len(), path);
        Ok(Self::new(detections))
    }
}

impl OcrAdapter for ReplayOcr {
    fn name(&self) -> &str {
        "replay"
    }

    fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>, OcrError> {
        Ok(self.detections.clone())
    }
}

/// Parse OCR output into detections.
///
/// Accepts a flat list of lines, the per-page form PaddleOCR returns
/// (`[[line, ...], null, ...]`), or lines written as objects with
/// `polygon`/`text`/`confidence` keys. A list element counts as a page when
/// any of its items is a line. Lines that cannot be understood are skipped
/// with a warning; output that is not a JSON list is an error.
pub fn parse_paddle_json(raw: &str) -> Result<Vec<Detection>, OcrError> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| OcrError::Unavailable(format!("malformed OCR output: {e}")))?;

    let top = match value {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(OcrError::Unavailable(format!(
                "malformed OCR output: expected a list, got {}",
                json_kind(&other)
            )))
        }
    };

    // Each element is either a page of lines or a line itself
    let mut lines: Vec<&Value> = Vec::with_capacity(top.len());
    for item in &top {
        match item {
            Value::Null => {}
            Value::Array(items) if items.is_empty() => {}
            Value::Array(items) if items.iter().any(is_line) => lines.extend(items.iter()),
            line => lines.push(line),
        }
    }

    let mut detections = Vec::with_capacity(lines.len());
    for (idx, line) in lines.into_iter().enumerate() {
        match parse_line(line) {
            Some(detection) => detections.push(detection),
            None => warn!("Skipping unrecognized OCR line #{}: {}", idx, line),
        }
    }

    Ok(detections)
}

fn is_line(value: &Value) -> bool {
    if value.is_object() {
        return true;
    }
    value
        .as_array()
        .and_then(|parts| parts.first())
        .and_then(Value::as_array)
        .and_then(|points| points.first())
        .and_then(Value::as_array)
        .and_then(|point| point.first())
        .is_some_and(Value::is_number)
}

fn parse_line(value: &Value) -> Option<Detection> {
    if value.is_object() {
        let detection: Detection = serde_json::from_value(value.clone()).ok()?;
        return Detection::new(detection.polygon, detection.text, detection.confidence);
    }

    let parts = value.as_array()?;
    let polygon = parts
        .first()?
        .as_array()?
        .iter()
        .map(|point| {
            let xy = point.as_array()?;
            Some((xy.first()?.as_f64()? as f32, xy.get(1)?.as_f64()? as f32))
        })
        .collect::<Option<Vec<_>>>()?;

    let recognized = parts.get(1)?.as_array()?;
    let text = recognized.first()?.as_str()?;
    let confidence = recognized.get(1).and_then(Value::as_f64).unwrap_or(0.0) as f32;

    Detection::new(polygon, text, confidence)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAT: &str = r#"[
        [[[10, 20], [110, 20], [110, 50], [10, 50]], ["ACME-100", 0.95]],
        [[[12.5, 80], [118, 80], [118, 112], [12.5, 112]], ["ACME-100", 0.91]]
    ]"#;

    #[test]
    fn test_parse_flat_lines() {
        let detections = parse_paddle_json(FLAT).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].text, "ACME-100");
        assert!((detections[0].confidence - 0.95).abs() < 1e-6);
        assert_eq!(detections[1].polygon[0], (12.5, 80.0));
    }

    #[test]
    fn test_malformed_line_skipped_among_flat_lines() {
        let raw = r#"[
            [[[10, 20], [110, 20], [110, 50], [10, 50]], ["ACME-100", 0.95]],
            [[], ["BAD", 0.8]],
            [[[12, 80], [118, 80], [118, 112], [12, 112]], ["ACME-100", 0.91]]
        ]"#;
        let detections = parse_paddle_json(raw).unwrap();
        assert_eq!(detections.len(), 2);
        assert!(detections.iter().all(|d| d.text == "ACME-100"));
    }

    #[test]
    fn test_malformed_line_skipped_inside_page() {
        let raw = r#"[[
            [[[10, 20], [110, 20], [110, 50], [10, 50]], ["LOT 44B", 0.9]],
            [[], ["BAD", 0.8]],
            "noise"
        ], null]"#;
        let detections = parse_paddle_json(raw).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text, "LOT 44B");
    }

    #[test]
    fn test_parse_page_wrapped() {
        let raw = format!("[{FLAT}, null]");
        let detections = parse_paddle_json(&raw).unwrap();
        assert_eq!(detections.len(), 2);
        assert!((detections[1].confidence - 0.91).abs() < 1e-6);
    }

    #[test]
    fn test_parse_empty_results() {
        assert!(parse_paddle_json("[]").unwrap().is_empty());
        assert!(parse_paddle_json("[null]").unwrap().is_empty());
        assert!(parse_paddle_json("null").unwrap().is_empty());
    }

    #[test]
    fn test_parse_object_lines() {
        let raw = r#"[{"polygon": [[0, 0], [5, 0], [5, 5]], "text": "LOT 44B", "confidence": 0.9}]"#;
        let detections = parse_paddle_json(raw).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text, "LOT 44B");
    }

    #[test]
    fn test_degenerate_lines_skipped() {
        // second line has only two polygon points
        let raw = r#"[
            [[[0, 0], [5, 0], [5, 5], [0, 5]], ["OK", 0.8]],
            [[[0, 0], [5, 0]], ["BAD", 0.8]]
        ]"#;
        let detections = parse_paddle_json(raw).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text, "OK");
    }

    #[test]
    fn test_malformed_output_is_unavailable() {
        assert!(matches!(
            parse_paddle_json("Traceback (most recent call last)"),
            Err(OcrError::Unavailable(_))
        ));
        assert!(matches!(
            parse_paddle_json(r#"{"error": "no model"}"#),
            Err(OcrError::Unavailable(_))
        ));
    }

    #[test]
    fn test_replay_adapter_returns_same_detections() {
        let adapter = ReplayOcr::new(parse_paddle_json(FLAT).unwrap());
        let image = RgbImage::new(4, 4);
        assert_eq!(adapter.detect(&image).unwrap().len(), 2);
        assert_eq!(adapter.detect(&image).unwrap().len(), 2);
        assert_eq!(adapter.name(), "replay");
    }

    #[test]
    fn test_replay_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, FLAT.as_bytes()).unwrap();

        let adapter = ReplayOcr::from_file(file.path()).unwrap();
        assert_eq!(adapter.detect(&RgbImage::new(1, 1)).unwrap().len(), 2);

        assert!(ReplayOcr::from_file(Path::new("/nonexistent/ocr.json")).is_err());
    }
}
