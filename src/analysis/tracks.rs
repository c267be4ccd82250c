//! Per-track state
//!
//! `TrackStateManager` owns one `TrackRecord` per tracker-assigned id. Records
//! are created on first sighting and live as long as the manager, one per
//! stream. The manager is driven from the frame loop only; report tasks never
//! touch it.

use image::{imageops, RgbImage};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

use crate::analysis::events::ViolationKind;
use crate::analysis::speed::{estimate_speed, SpeedWindow};
use crate::config::{OcrConfig, SpeedConfig};
use crate::vision::ocr_preprocess::prepare_plate_crop;
use crate::vision::{BoundingBox, ObjectClass, OcrRequest, PlatePolicy, PlateReader, PlateReading, TrackedObject};

/// Last-attempt value for a track that has never been read
pub const OCR_NEVER_ATTEMPTED: i64 = -100;

/// State kept for one track
#[derive(Debug, Clone)]
pub struct TrackRecord {
    /// Centre of the last observed box
    pub last_position: Option<(f32, f32)>,
    pub speed: SpeedWindow,
    /// Raw frame index of the last recognition attempt
    pub last_ocr_frame: i64,
    /// Highest-scoring plate seen so far
    pub best_plate: Option<PlateReading>,
    /// Kinds already reported for this track
    pub logged_violations: HashSet<ViolationKind>,
}

impl TrackRecord {
    fn new(window: usize) -> Self {
        Self {
            last_position: None,
            speed: SpeedWindow::new(window),
            last_ocr_frame: OCR_NEVER_ATTEMPTED,
            best_plate: None,
            logged_violations: HashSet::new(),
        }
    }
}

/// What happened when a track was considered for recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrAttempt {
    /// Throttled, or a confident plate is already held
    NotDue,
    /// Crop collapsed after clamping to the frame
    EmptyCrop,
    /// Reader returned nothing usable
    NoReading,
    /// A plate was read but did not beat the held one
    Kept,
    /// Held plate replaced
    Improved,
}

/// Plate-bearing region of a vehicle box as (x, y, width, height)
///
/// The box is grown by `crop_margin` of its size on every side and clamped to
/// the frame, then only the bottom part is kept: `motorcycle_crop_ratio` of the
/// height for motorcycles, `vehicle_crop_ratio` otherwise.
pub fn plate_crop_region(
    bbox: &BoundingBox,
    class: ObjectClass,
    frame_width: u32,
    frame_height: u32,
    settings: &OcrConfig,
) -> Option<(u32, u32, u32, u32)> {
    let (x1, y1, x2, y2) = bbox.to_pixels();
    let margin_x = ((x2 - x1) as f64 * settings.crop_margin) as i64;
    let margin_y = ((y2 - y1) as f64 * settings.crop_margin) as i64;

    let vx1 = (x1 - margin_x).max(0);
    let vy1 = (y1 - margin_y).max(0);
    let vx2 = (x2 + margin_x).min(frame_width as i64);
    let vy2 = (y2 + margin_y).min(frame_height as i64);

    let ratio = if class == ObjectClass::Motorcycle {
        settings.motorcycle_crop_ratio
    } else {
        settings.vehicle_crop_ratio
    };
    let zone_y1 = vy1 + ((1.0 - ratio) * (vy2 - vy1) as f64) as i64;

    if vx2 <= vx1 || vy2 <= zone_y1 {
        return None;
    }

    Some((
        vx1 as u32,
        zone_y1 as u32,
        (vx2 - vx1) as u32,
        (vy2 - zone_y1) as u32,
    ))
}

/// Owned store of every track seen in a stream
pub struct TrackStateManager {
    records: HashMap<u32, TrackRecord>,
    speed_settings: SpeedConfig,
    ocr_settings: OcrConfig,
    policy: PlatePolicy,
}

impl TrackStateManager {
    pub fn new(speed_settings: SpeedConfig, ocr_settings: OcrConfig) -> Self {
        let policy = PlatePolicy::new(ocr_settings.fallback_min_score);
        Self {
            records: HashMap::new(),
            speed_settings,
            ocr_settings,
            policy,
        }
    }

    /// Record a sighting and return the smoothed speed in km/h
    ///
    /// Creates the record on first sighting.
    pub fn observe(&mut self, object: &TrackedObject, effective_fps: f64) -> f64 {
        let window = self.speed_settings.window;
        let record = self
            .records
            .entry(object.track_id)
            .or_insert_with(|| TrackRecord::new(window));

        let center = object.center();
        let raw = estimate_speed(record.last_position, center, effective_fps, &self.speed_settings);
        let smoothed = record.speed.push(raw);
        record.last_position = Some(center);
        trace!(
            track_id = object.track_id,
            raw,
            smoothed,
            samples = record.speed.len(),
            "Speed sample"
        );

        smoothed
    }

    /// Whether a track should be read at `frame_index`
    pub fn ocr_due(&self, track_id: u32, frame_index: u64) -> bool {
        let Some(record) = self.records.get(&track_id) else {
            return true;
        };
        let elapsed = frame_index as i64 - record.last_ocr_frame;

        match &record.best_plate {
            None => elapsed > self.ocr_settings.first_attempt_gap,
            Some(plate) if plate.score < self.ocr_settings.confident_score => {
                elapsed > self.ocr_settings.retry_gap
            }
            Some(_) => false,
        }
    }

    /// Read the plate zone of `object` if recognition is due
    ///
    /// The attempt is throttled whether or not anything usable comes back.
    /// Reader failures count as an empty read.
    pub fn refresh_plate(
        &mut self,
        object: &TrackedObject,
        frame_index: u64,
        frame: &RgbImage,
        reader: &mut dyn PlateReader,
    ) -> OcrAttempt {
        if !self.ocr_due(object.track_id, frame_index) {
            return OcrAttempt::NotDue;
        }

        let window = self.speed_settings.window;
        self.records
            .entry(object.track_id)
            .or_insert_with(|| TrackRecord::new(window))
            .last_ocr_frame = frame_index as i64;

        let (width, height) = frame.dimensions();
        let Some((x, y, w, h)) = plate_crop_region(&object.bbox, object.class, width, height, &self.ocr_settings)
        else {
            debug!(track_id = object.track_id, "Plate zone empty after clamping");
            return OcrAttempt::EmptyCrop;
        };

        let crop = imageops::crop_imm(frame, x, y, w, h).to_image();
        let region = prepare_plate_crop(&crop, &self.ocr_settings);
        let request = OcrRequest {
            track_id: object.track_id,
            frame_index,
            region: &region,
            allowlist: &self.ocr_settings.allowlist,
        };

        let candidates = match reader.read(&request) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(track_id = object.track_id, "Plate reader failed: {:#}", e);
                Vec::new()
            }
        };

        match self.policy.select(&candidates) {
            Some(reading) => {
                if self.offer_plate(object.track_id, reading) {
                    OcrAttempt::Improved
                } else {
                    OcrAttempt::Kept
                }
            }
            None => OcrAttempt::NoReading,
        }
    }

    /// Keep `reading` if the track has no plate or it scores strictly higher
    ///
    /// Readings without a finite score are refused.
    pub fn offer_plate(&mut self, track_id: u32, reading: PlateReading) -> bool {
        if !reading.score.is_finite() {
            debug!(track_id, plate = %reading.text, "Refused plate without a finite score");
            return false;
        }
        let window = self.speed_settings.window;
        let record = self
            .records
            .entry(track_id)
            .or_insert_with(|| TrackRecord::new(window));

        let better = match &record.best_plate {
            None => true,
            Some(current) => reading.score > current.score,
        };
        if better {
            debug!(
                track_id,
                plate = %reading.text,
                score = reading.score,
                strict = reading.strict,
                "Updated plate"
            );
            record.best_plate = Some(reading);
        }
        better
    }

    /// Mark `kind` as reported for a track; true only the first time
    pub fn claim_violation(&mut self, track_id: u32, kind: ViolationKind) -> bool {
        let window = self.speed_settings.window;
        self.records
            .entry(track_id)
            .or_insert_with(|| TrackRecord::new(window))
            .logged_violations
            .insert(kind)
    }

    pub fn best_plate(&self, track_id: u32) -> Option<&PlateReading> {
        self.records.get(&track_id).and_then(|r| r.best_plate.as_ref())
    }

    /// Number of tracks seen so far
    pub fn len(&self) -> usize {
        self.records.len()
    }
}
