//! Annotated image files

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Directory of annotated verification images
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for an image taken at `timestamp`:
    /// `verify_<YYYYmmdd_HHMMSS_mmm>_<8 hex>.png`. The random suffix keeps
    /// paths distinct within the same millisecond.
    pub fn resolve_path(&self, timestamp: DateTime<Local>) -> PathBuf {
        let suffix = Uuid::new_v4().simple().to_string();
        self.dir.join(format!(
            "verify_{}_{}.png",
            timestamp.format("%Y%m%d_%H%M%S_%3f"),
            &suffix[..8]
        ))
    }

    /// Write `image` as PNG, creating the parent directory if needed
    pub fn save(&self, image: &RgbImage, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create image directory {:?}", parent))?;
        }

        image
            .save(path)
            .with_context(|| format!("Failed to write annotated image {:?}", path))?;
        debug!("Saved annotated image {:?}", path);
        Ok(())
    }
}
