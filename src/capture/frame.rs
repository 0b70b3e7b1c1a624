//! Frame data structures for live capture

use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;

/// A frame delivered by a live source
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Decoded pixels, shared with whoever holds the frame
    pub image: Arc<RgbImage>,
    /// Position in the source's output, starting at 1
    pub sequence: u64,
    /// Timestamp when the frame was produced
    pub timestamp: Instant,
}

impl CapturedFrame {
    /// Create a new captured frame
    pub fn new(image: Arc<RgbImage>, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            timestamp: Instant::now(),
        }
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
