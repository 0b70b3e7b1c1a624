//! Vision/OCR Layer
//!
//! Runs the configured OCR adapter on a frame and turns its output into
//! ordered detections. Also renders annotated images of those detections.

pub mod annotate;
pub mod command;
pub mod ocr;
pub mod ocr_preprocess;

pub use annotate::Annotator;
pub use command::CommandOcr;
pub use ocr::{OcrAdapter, OcrError, ReplayOcr};
pub use ocr_preprocess::apply_preprocessing;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::config::{OcrConfig, OcrPreprocessing};

/// One OCR hit: a text region with its geometry and confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding polygon in image pixels, at least three points
    pub polygon: Vec<(f32, f32)>,
    /// Raw recognized text
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
}

impl Detection {
    /// Build a detection, rejecting polygons with fewer than three points or
    /// non-finite coordinates. Confidence is clamped into [0, 1].
    pub fn new(polygon: Vec<(f32, f32)>, text: impl Into<String>, confidence: f32) -> Option<Self> {
        if polygon.len() < 3 || polygon.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return None;
        }

        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Some(Self {
            polygon,
            text: text.into(),
            confidence,
        })
    }

    /// Axis-aligned rectangle from (x, y) with the given size
    #[cfg(test)]
    pub fn rect(x: f32, y: f32, width: f32, height: f32, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            polygon: vec![(x, y), (x + width, y), (x + width, y + height), (x, y + height)],
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Bounding box (x, y, width, height)
    pub fn bounds(&self) -> (u32, u32, u32, u32) {
        polygon_to_bounds(&self.polygon)
    }

    /// Minimum x and minimum y over the polygon
    pub fn top_left(&self) -> (f32, f32) {
        let min_x = self.polygon.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
        let min_y = self.polygon.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
        (min_x, min_y)
    }
}

/// Vision settings derived from the OCR config
#[derive(Debug, Clone, Default)]
pub struct VisionConfig {
    /// Minimum confidence threshold for detections (0.0 - 1.0)
    pub min_confidence: f32,
    /// Filters applied before OCR
    pub preprocessing: OcrPreprocessing,
}

impl From<&OcrConfig> for VisionConfig {
    fn from(config: &OcrConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            preprocessing: config.preprocessing.clone(),
        }
    }
}

/// Result of running OCR on one image
#[derive(Debug, Clone)]
pub struct VisionResult {
    /// Detections in engine order
    pub detections: Vec<Detection>,
    /// Detections dropped by the confidence floor
    pub filtered: usize,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

/// OCR front end: preprocessing, the adapter call, and filtering
pub struct VisionPipeline {
    adapter: Box<dyn OcrAdapter>,
    config: VisionConfig,
}

impl VisionPipeline {
    pub fn new(adapter: Box<dyn OcrAdapter>, config: VisionConfig) -> Self {
        Self { adapter, config }
    }

    /// Name of the underlying OCR engine
    pub fn engine_name(&self) -> &str {
        self.adapter.name()
    }

    /// Run OCR on `image`. Polygons are reported in `image` coordinates even
    /// when preprocessing upscaled the copy sent to the engine.
    pub fn process(&self, image: &RgbImage) -> Result<VisionResult, OcrError> {
        let start = Instant::now();

        let raw = if self.config.preprocessing.enabled {
            let prepared = apply_preprocessing(image, &self.config.preprocessing);
            let detections = self.adapter.detect(&prepared.image)?;
            rescale(detections, prepared.scale)
        } else {
            self.adapter.detect(image)?
        };

        let total = raw.len();
        let detections: Vec<Detection> = raw
            .into_iter()
            .filter(|d| d.confidence >= self.config.min_confidence)
            .collect();

        let processing_time = start.elapsed();
        debug!(
            "OCR ({}) complete in {:?}: {} detections ({} below confidence floor)",
            self.adapter.name(),
            processing_time,
            detections.len(),
            total - detections.len()
        );

        Ok(VisionResult {
            filtered: total - detections.len(),
            detections,
            processing_time_ms: processing_time.as_millis() as u64,
        })
    }
}

/// Map detections from an upscaled image back to source coordinates
fn rescale(detections: Vec<Detection>, scale: u32) -> Vec<Detection> {
    if scale <= 1 {
        return detections;
    }

    let factor = 1.0 / scale as f32;
    detections
        .into_iter()
        .map(|mut d| {
            for point in &mut d.polygon {
                point.0 *= factor;
                point.1 *= factor;
            }
            d
        })
        .collect()
}

/// Convert polygon points to bounding box
pub fn polygon_to_bounds(polygon: &[(f32, f32)]) -> (u32, u32, u32, u32) {
    if polygon.is_empty() {
        return (0, 0, 0, 0);
    }

    let min_x = polygon.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let min_y = polygon.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let max_x = polygon.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    let max_y = polygon.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

    (
        min_x as u32,
        min_y as u32,
        (max_x - min_x) as u32,
        (max_y - min_y) as u32,
    )
}
