//! Frame data structures for decoded stream content

use image::RgbImage;
use std::time::Duration;

/// A decoded frame from a stored stream
#[derive(Debug, Clone)]
pub struct Frame {
    /// RGB pixel data
    pub image: RgbImage,
    /// Raw frame sequence number, starting at 1
    pub index: u64,
    /// Position in the stream
    pub timestamp: Duration,
}

impl Frame {
    /// Create a new frame
    pub fn new(image: RgbImage, index: u64, timestamp: Duration) -> Self {
        Self {
            image,
            index,
            timestamp,
        }
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
