//! OCR (Optical Character Recognition) seam
//!
//! Text recognition is delegated to an external engine. The pipeline hands it
//! a plate-bearing crop and consumes whatever candidates come back.

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Single recognition candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCandidate {
    /// Recognized text, as emitted by the engine
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub score: f32,
}

impl TextCandidate {
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            score,
        }
    }
}

/// A region handed to the recognition engine
#[derive(Debug)]
pub struct OcrRequest<'a> {
    /// Track the crop belongs to
    pub track_id: u32,
    /// Raw frame sequence number
    pub frame_index: u64,
    /// Crop to read
    pub region: &'a RgbImage,
    /// Characters the engine may emit
    pub allowlist: &'a str,
}

/// External text-recognition engine
pub trait PlateReader: Send {
    /// Read candidate strings from a region, in engine output order
    fn read(&mut self, request: &OcrRequest<'_>) -> Result<Vec<TextCandidate>>;
}
