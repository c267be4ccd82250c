//! Object tracker seam
//!
//! The detector/tracker is an external collaborator. It hands back one
//! `TrackedObject` per box with a track id that stays stable while it keeps
//! the physical object. Track ids may be reused after a long occlusion; nothing
//! here can tell, so a reused id continues the old track's history.

use anyhow::Result;

use crate::capture::frame::Frame;
use crate::vision::{BoundingBox, ObjectClass, TrackedObject};

/// External detector + tracker
pub trait ObjectTracker: Send {
    /// Track objects in a retained frame
    fn track(&mut self, frame: &Frame) -> Result<Vec<TrackedObject>>;
}

/// All objects tracked in one retained frame
#[derive(Debug, Clone)]
pub struct DetectionFrame {
    /// Raw frame sequence number
    pub sequence: u64,
    /// Frame rate reported by the source
    pub nominal_fps: f64,
    /// Objects in collaborator order
    pub objects: Vec<TrackedObject>,
}

impl DetectionFrame {
    pub fn new(sequence: u64, nominal_fps: f64, objects: Vec<TrackedObject>) -> Self {
        Self {
            sequence,
            nominal_fps,
            objects,
        }
    }

    /// Boxes of every person in the frame
    pub fn person_boxes(&self) -> Vec<BoundingBox> {
        self.objects
            .iter()
            .filter(|o| o.class == ObjectClass::Person)
            .map(|o| o.bbox)
            .collect()
    }

    /// Vehicles in collaborator order
    pub fn vehicles(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.iter().filter(|o| o.class.is_vehicle())
    }
}
