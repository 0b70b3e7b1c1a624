//! Application Configuration
//!
//! User settings stored in TOML format. Every section falls back to its
//! defaults, so a config file only needs the keys it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Text comparison settings
    pub comparison: ComparisonConfig,
    /// OCR engine settings
    pub ocr: OcrConfig,
    /// Annotated image rendering
    pub annotation: AnnotationConfig,
    /// History and image storage
    pub storage: StorageConfig,
    /// Live capture settings
    pub capture: CaptureSettings,
}

/// Comparison settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Minimum similarity (0.0 - 1.0) for a pass; 1.0 requires an exact
    /// match after normalization
    pub threshold: f64,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self { threshold: 1.0 }
    }
}

/// OCR engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// External OCR program. It receives the image path as its last
    /// argument and prints PaddleOCR-style JSON on stdout.
    pub command: Option<String>,
    /// Extra arguments placed before the image path
    pub args: Vec<String>,
    /// Maximum time a single OCR call may take
    pub timeout_ms: u64,
    /// Detections below this confidence (0.0 - 1.0) are dropped
    pub min_confidence: f32,
    /// Image preprocessing applied before OCR
    pub preprocessing: OcrPreprocessing,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_ms: 30_000,
            min_confidence: 0.0,
            preprocessing: OcrPreprocessing::default(),
        }
    }
}

/// Preprocessing filters applied to an image before it is sent to OCR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrPreprocessing {
    /// Master switch
    pub enabled: bool,
    /// Integer upscale factor (1 = unchanged)
    pub scale: u32,
    /// Contrast factor around mid-gray (1.0 = unchanged)
    pub contrast: f32,
    /// Sharpen strength (0.0 = off)
    pub sharpen: f32,
    /// Convert to grayscale
    pub grayscale: bool,
    /// Otsu binarization (implies grayscale)
    pub binarize: bool,
    /// Invert colors
    pub invert: bool,
}

impl Default for OcrPreprocessing {
    fn default() -> Self {
        Self {
            enabled: false,
            scale: 1,
            contrast: 1.0,
            sharpen: 0.0,
            grayscale: false,
            binarize: false,
            invert: false,
        }
    }
}

/// Annotated image rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Outline thickness in pixels
    pub line_thickness: u32,
    /// Label font height in pixels
    pub font_scale: f32,
    /// TrueType font for labels; system fonts are tried when unset
    pub font_path: Option<PathBuf>,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            line_thickness: 2,
            font_scale: 18.0,
            font_path: None,
        }
    }
}

/// History and image storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory; the platform data directory when unset
    pub data_dir: Option<PathBuf>,
    /// SQLite file name inside the data directory
    pub database_file: String,
    /// Annotated image directory name inside the data directory
    pub images_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            database_file: "history.db".to_string(),
            images_dir: "images".to_string(),
        }
    }
}

/// Live capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Frame rate of the live source
    pub fps: u32,
    /// Frames buffered between source and display; extra frames are dropped
    pub channel_capacity: usize,
    /// Restart replay sources from the first frame when exhausted
    pub loop_replay: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            channel_capacity: 2,
            loop_replay: true,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config {:?}", path))?;
    Ok(())
}
