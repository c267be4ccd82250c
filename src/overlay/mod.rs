//! Frame Annotation Layer
//!
//! Draws vehicle boxes onto processed frames: green for clean vehicles, red
//! once any violation fired. When a font is configured each box also gets a
//! filled label strip with the plate, speed and violation kinds.

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::info;

use crate::analysis::ViolationKind;
use crate::config::OverlaySettings;
use crate::vision::BoundingBox;

pub const CLEAN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const VIOLATION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: i32 = 2;

/// What to draw for one vehicle
#[derive(Debug, Clone)]
pub struct VehicleAnnotation<'a> {
    pub bbox: BoundingBox,
    pub plate: Option<&'a str>,
    /// Smoothed speed in km/h
    pub speed: f64,
    pub violations: &'a [ViolationKind],
}

/// Draws vehicle annotations onto frames
pub struct Annotator {
    font: Option<FontVec>,
    label_speed_min: f64,
}

impl Annotator {
    /// Create an annotator, loading the label font if one is configured
    pub fn new(settings: &OverlaySettings) -> Result<Self> {
        let font = match &settings.font_path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read font {:?}", path))?;
                let font = FontVec::try_from_vec(bytes)
                    .with_context(|| format!("Invalid font {:?}", path))?;
                info!("Loaded label font from {:?}", path);
                font
            }
            None => return Ok(Self::boxes_only(settings.label_speed_min)),
        };

        Ok(Self {
            font: Some(font),
            label_speed_min: settings.label_speed_min,
        })
    }

    /// Box-only annotator
    pub fn boxes_only(label_speed_min: f64) -> Self {
        Self {
            font: None,
            label_speed_min,
        }
    }

    /// Label text for a vehicle: plate, speed above the threshold, kinds
    pub fn label_text(&self, vehicle: &VehicleAnnotation<'_>) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(plate) = vehicle.plate.filter(|p| !p.is_empty()) {
            parts.push(plate.to_string());
        }
        if vehicle.speed > self.label_speed_min {
            parts.push(format!("{} km/h", vehicle.speed));
        }
        if !vehicle.violations.is_empty() {
            let kinds: Vec<&str> = vehicle.violations.iter().map(|k| k.label()).collect();
            parts.push(kinds.join(", "));
        }
        parts.join(" | ")
    }

    /// Draw one vehicle onto `image`
    pub fn annotate(&self, image: &mut RgbImage, vehicle: &VehicleAnnotation<'_>) {
        let color = if vehicle.violations.is_empty() {
            CLEAN_COLOR
        } else {
            VIOLATION_COLOR
        };

        let (x1, y1, x2, y2) = vehicle.bbox.to_pixels();
        let width = (x2 - x1).max(1) as u32;
        let height = (y2 - y1).max(1) as u32;
        for inset in 0..BOX_THICKNESS {
            let w = width.saturating_sub(2 * inset as u32).max(1);
            let h = height.saturating_sub(2 * inset as u32).max(1);
            let rect = Rect::at(x1 as i32 + inset, y1 as i32 + inset).of_size(w, h);
            draw_hollow_rect_mut(image, rect, color);
        }

        let Some(font) = &self.font else {
            return;
        };
        let text = self.label_text(vehicle);
        if text.is_empty() {
            return;
        }

        let scale = PxScale::from((image.width() as f32 / 50.0).max(14.0));
        let (tw, th) = text_size(scale, font, &text);
        let strip_top = y1 as i32 - th as i32 - 10;
        draw_filled_rect_mut(image, Rect::at(x1 as i32, strip_top).of_size(tw.max(1), th + 10), color);
        draw_text_mut(image, TEXT_COLOR, x1 as i32, strip_top + 5, scale, font, &text);
    }
}
