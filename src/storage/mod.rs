//! Storage Layer
//!
//! Handles persistence of verification history (SQLite) and annotated
//! images (PNG files), plus the platform directories they live in.

pub mod history;
pub mod images;

pub use history::{HistoryStore, SqliteHistoryStore};
#[cfg(test)]
pub use history::MemoryHistory;
pub use images::ImageStore;

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::StorageConfig;

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "stampverify", "StampVerify")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory {:?}", config_dir))?;

    Ok(config_dir)
}

/// Resolved locations of the history database and the image directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    pub database: PathBuf,
    pub images: PathBuf,
}

impl StoragePaths {
    /// Resolve against `storage.data_dir`, or the platform data directory
    pub fn resolve(config: &StorageConfig) -> Result<Self> {
        let base = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => get_data_dir()?,
        };

        Ok(Self {
            database: base.join(&config.database_file),
            images: base.join(&config.images_dir),
        })
    }
}
