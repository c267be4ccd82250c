//! Vision Layer
//!
//! Types exchanged with the external detector/tracker and text-recognition
//! collaborators, plus plate normalization and crop enhancement.
//! Detection and recognition themselves happen outside this crate:
//! - `ObjectTracker` supplies tracked boxes per frame
//! - `PlateReader` supplies candidate strings for an image region

pub mod detection;
pub mod ocr;
pub mod ocr_preprocess;
pub mod plate;
pub mod replay;

pub use detection::{DetectionFrame, ObjectTracker};
pub use ocr::{OcrRequest, PlateReader, TextCandidate};
pub use plate::{PlateReading, PlatePolicy};
pub use replay::{ReplayPlateReader, ReplayTracker};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Object classes the pipeline cares about, keyed by COCO class id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Person,
    Car,
    Motorcycle,
    Bus,
    Truck,
    /// Any other detector class; ignored by the rules
    Other(u32),
}

impl ObjectClass {
    /// Map a COCO class id
    pub fn from_coco_id(id: u32) -> Self {
        match id {
            0 => ObjectClass::Person,
            2 => ObjectClass::Car,
            3 => ObjectClass::Motorcycle,
            5 => ObjectClass::Bus,
            7 => ObjectClass::Truck,
            other => ObjectClass::Other(other),
        }
    }

    /// Whether the class is tracked as a vehicle
    pub fn is_vehicle(&self) -> bool {
        matches!(
            self,
            ObjectClass::Car | ObjectClass::Motorcycle | ObjectClass::Bus | ObjectClass::Truck
        )
    }

    /// Cars, buses and trucks
    pub fn is_four_wheeler(&self) -> bool {
        matches!(self, ObjectClass::Car | ObjectClass::Bus | ObjectClass::Truck)
    }

    /// Upper-case label used in records and overlays
    pub fn label(&self) -> &'static str {
        match self {
            ObjectClass::Person => "PERSON",
            ObjectClass::Car => "CAR",
            ObjectClass::Motorcycle => "MOTORCYCLE",
            ObjectClass::Bus => "BUS",
            ObjectClass::Truck => "TRUCK",
            ObjectClass::Other(_) => "OTHER",
        }
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Axis-aligned box in frame pixels (x1, y1, x2, y2)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_xyxy(xyxy: [f32; 4]) -> Self {
        Self::new(xyxy[0], xyxy[1], xyxy[2], xyxy[3])
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Area shared with `other`; zero unless the boxes strictly overlap
    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        if ix1 < ix2 && iy1 < iy2 {
            (ix2 - ix1) * (iy2 - iy1)
        } else {
            0.0
        }
    }

    /// Integer pixel corners, truncated toward zero
    pub fn to_pixels(&self) -> (i64, i64, i64, i64) {
        (
            self.x1 as i64,
            self.y1 as i64,
            self.x2 as i64,
            self.y2 as i64,
        )
    }
}

/// One tracked object reported by the external tracker for the current frame
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    /// Detector class
    pub class: ObjectClass,
    /// Identifier stable across frames while the tracker keeps the object
    pub track_id: u32,
    /// Box in processed-frame pixels
    pub bbox: BoundingBox,
}

impl TrackedObject {
    pub fn new(class: ObjectClass, track_id: u32, bbox: BoundingBox) -> Self {
        Self {
            class,
            track_id,
            bbox,
        }
    }

    /// Box centre used as the track position
    pub fn center(&self) -> (f32, f32) {
        self.bbox.center()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coco_mapping() {
        assert_eq!(ObjectClass::from_coco_id(0), ObjectClass::Person);
        assert_eq!(ObjectClass::from_coco_id(3), ObjectClass::Motorcycle);
        assert_eq!(ObjectClass::from_coco_id(1), ObjectClass::Other(1));
        assert_eq!(ObjectClass::from_coco_id(7), ObjectClass::Truck);
        assert_eq!(ObjectClass::from_coco_id(5).label(), "BUS");
    }

    #[test]
    fn test_vehicle_classes() {
        assert!(ObjectClass::Car.is_vehicle());
        assert!(ObjectClass::Motorcycle.is_vehicle());
        assert!(!ObjectClass::Motorcycle.is_four_wheeler());
        assert!(!ObjectClass::Person.is_vehicle());
        assert!(!ObjectClass::Other(1).is_vehicle());
    }

    #[test]
    fn test_intersection_area() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        assert!((a.intersection_area(&b) - 25.0).abs() < 1e-6);

        // Touching edges do not overlap
        let c = BoundingBox::new(10.0, 0.0, 20.0, 10.0);
        assert_eq!(a.intersection_area(&c), 0.0);
    }

    #[test]
    fn test_center_and_pixels() {
        let b = BoundingBox::new(10.7, 20.2, 30.9, 40.5);
        let (cx, cy) = b.center();
        assert!((cx - 20.8).abs() < 1e-4);
        assert!((cy - 30.35).abs() < 1e-4);
        assert_eq!(b.to_pixels(), (10, 20, 30, 40));
    }
}
