//! Message types between the frame loop and the reporting workers

use chrono::{DateTime, Local};
use image::RgbImage;

use crate::analysis::{ViolationEvent, ViolationKind};
use crate::vision::ObjectClass;

/// Owned snapshot of one violation, safe to hand to another thread
#[derive(Debug, Clone)]
pub struct ViolationReport {
    /// Stream the violation was seen in
    pub stream_id: String,
    pub kind: ViolationKind,
    pub track_id: u32,
    /// Annotated frame at the time of detection
    pub frame: RgbImage,
    /// Smoothed speed in km/h
    pub speed: f64,
    /// Plate text, or the per-track placeholder
    pub vehicle_number: String,
    pub vehicle_class: ObjectClass,
    /// Wall-clock detection time
    pub detected_at: DateTime<Local>,
}

impl ViolationReport {
    /// Build a report from an event and a copy of the annotated frame
    pub fn from_event(stream_id: &str, event: &ViolationEvent, frame: RgbImage) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            kind: event.kind,
            track_id: event.track_id,
            frame,
            speed: event.speed,
            vehicle_number: event.vehicle_number(),
            vehicle_class: event.vehicle_class,
            detected_at: Local::now(),
        }
    }

    /// Deterministic evidence file name
    pub fn evidence_file_name(&self) -> String {
        format!("{}_{}_{}.jpg", self.stream_id, self.kind.slug(), self.track_id)
    }
}

/// Commands sent to the reporting dispatcher
#[derive(Debug)]
pub enum ReportCommand {
    /// Persist evidence and notify the backend
    Submit(Box<ViolationReport>),
    /// Stop accepting reports and drain in-flight ones
    Shutdown,
}
