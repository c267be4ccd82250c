//! Plate crop enhancement
//!
//! Roadside footage is small and blurry by the time a plate zone is cut out
//! of a vehicle box. Crops are upscaled, converted to grayscale, sharpened and
//! contrast-stretched before they reach the recognition engine.

use image::{imageops, DynamicImage, GrayImage, RgbImage};
use tracing::debug;

use crate::config::OcrConfig;

/// Contrast factor applied around mid-gray
const CONTRAST_FACTOR: f32 = 1.5;

/// Enhance a plate crop according to settings
/// Returns a new RGB image (gray replicated across channels) for the reader
pub fn prepare_plate_crop(crop: &RgbImage, settings: &OcrConfig) -> RgbImage {
    if !settings.preprocess || crop.width() == 0 || crop.height() == 0 {
        return crop.clone();
    }

    let upscaled = upscale_to_width(crop, settings.min_width);
    let gray = imageops::grayscale(&upscaled);
    let mut sharpened = imageproc::filter::sharpen3x3(&gray);
    apply_contrast(&mut sharpened, CONTRAST_FACTOR);

    debug!(
        "Prepared plate crop {}x{} -> {}x{}",
        crop.width(),
        crop.height(),
        sharpened.width(),
        sharpened.height()
    );

    DynamicImage::ImageLuma8(sharpened).to_rgb8()
}

/// Upscale so the crop is at least `min_width` wide, preserving aspect ratio
fn upscale_to_width(crop: &RgbImage, min_width: u32) -> RgbImage {
    let (width, height) = crop.dimensions();
    if width >= min_width {
        return crop.clone();
    }

    let scale = min_width as f32 / width as f32;
    let new_height = ((height as f32 * scale).round() as u32).max(1);
    imageops::resize(crop, min_width, new_height, imageops::FilterType::CatmullRom)
}

/// Stretch contrast around the midpoint (128)
/// Factor > 1.0 increases contrast, < 1.0 decreases
fn apply_contrast(image: &mut GrayImage, factor: f32) {
    for pixel in image.pixels_mut() {
        let val = pixel.0[0] as f32;
        pixel.0[0] = ((val - 128.0) * factor + 128.0).clamp(0.0, 255.0) as u8;
    }
}
