//! Replay collaborators
//!
//! Detector/tracker and recognition output recorded by an external run,
//! stored next to an ingested input as JSON lines. Each line describes one
//! raw frame:
//!
//! ```json
//! {"frame": 3, "objects": [{"class_id": 2, "track_id": 7, "bbox": [10, 20, 110, 90]}],
//!  "plates": {"7": [{"text": "TN38AB1234", "score": 0.91}]}}
//! ```
//!
//! Boxes are in processed-frame pixels (after any resize).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::capture::frame::Frame;
use crate::vision::detection::ObjectTracker;
use crate::vision::{OcrRequest, PlateReader, TextCandidate};
use crate::vision::{BoundingBox, ObjectClass, TrackedObject};

/// One recorded object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedObject {
    pub class_id: u32,
    pub track_id: u32,
    pub bbox: [f32; 4],
}

/// Everything recorded for one raw frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub frame: u64,
    #[serde(default)]
    pub objects: Vec<RecordedObject>,
    /// Recognition candidates keyed by track id
    #[serde(default)]
    pub plates: HashMap<u32, Vec<TextCandidate>>,
}

/// Recorded frames keyed by raw frame index
pub type Recording = Arc<BTreeMap<u64, RecordedFrame>>;

/// Load a JSON-lines recording
pub fn load_recording(path: &Path) -> Result<Recording> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open recording {:?}", path))?;

    let mut frames = BTreeMap::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("Failed to read recording")?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: RecordedFrame = serde_json::from_str(&line)
            .with_context(|| format!("Invalid recording line {} in {:?}", line_no + 1, path))?;
        frames.insert(frame.frame, frame);
    }

    info!("Loaded recording with {} frames from {:?}", frames.len(), path);
    Ok(Arc::new(frames))
}

/// Tracker that replays recorded objects
pub struct ReplayTracker {
    recording: Recording,
}

impl ReplayTracker {
    pub fn new(recording: Recording) -> Self {
        Self { recording }
    }
}

impl ObjectTracker for ReplayTracker {
    fn track(&mut self, frame: &Frame) -> Result<Vec<TrackedObject>> {
        let Some(recorded) = self.recording.get(&frame.index) else {
            return Ok(vec![]);
        };

        Ok(recorded
            .objects
            .iter()
            .map(|o| {
                TrackedObject::new(
                    ObjectClass::from_coco_id(o.class_id),
                    o.track_id,
                    BoundingBox::from_xyxy(o.bbox),
                )
            })
            .collect())
    }
}

/// Reader that replays recorded candidates for a (frame, track) pair
pub struct ReplayPlateReader {
    recording: Recording,
}

impl ReplayPlateReader {
    pub fn new(recording: Recording) -> Self {
        Self { recording }
    }
}

impl PlateReader for ReplayPlateReader {
    fn read(&mut self, request: &OcrRequest<'_>) -> Result<Vec<TextCandidate>> {
        let candidates: Vec<TextCandidate> = self
            .recording
            .get(&request.frame_index)
            .and_then(|f| f.plates.get(&request.track_id))
            .map(|recorded| {
                recorded
                    .iter()
                    .filter(|c| within_allowlist(&c.text, request.allowlist))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        debug!(
            track_id = request.track_id,
            frame = request.frame_index,
            "Replayed {} recognition candidates",
            candidates.len()
        );
        Ok(candidates)
    }
}

/// Whether every non-blank character of `text` is allowed; an empty list allows all
fn within_allowlist(text: &str, allowlist: &str) -> bool {
    allowlist.is_empty()
        || text
            .chars()
            .filter(|c| !c.is_whitespace())
            .all(|c| allowlist.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn write_recording(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn test_replay_objects_and_plates() {
        let file = write_recording(&[
            r#"{"frame": 3, "objects": [{"class_id": 2, "track_id": 7, "bbox": [10, 20, 110, 90]}], "plates": {"7": [{"text": "TN38AB1234", "score": 0.91}]}}"#,
            "",
            r#"{"frame": 6, "objects": [{"class_id": 0, "track_id": 8, "bbox": [0, 0, 5, 5]}]}"#,
        ]);
        let recording = load_recording(file.path()).unwrap();
        assert_eq!(recording.len(), 2);

        let mut tracker = ReplayTracker::new(recording.clone());
        let frame = Frame::new(RgbImage::new(4, 4), 3, Duration::from_millis(100));
        let objects = tracker.track(&frame).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].class, ObjectClass::Car);
        assert_eq!(objects[0].track_id, 7);

        let missing = Frame::new(RgbImage::new(4, 4), 4, Duration::from_millis(133));
        assert!(tracker.track(&missing).unwrap().is_empty());

        let mut reader = ReplayPlateReader::new(recording);
        let region = RgbImage::new(2, 2);
        let request = OcrRequest {
            track_id: 7,
            frame_index: 3,
            region: &region,
            allowlist: "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789",
        };
        let candidates = reader.read(&request).unwrap();
        assert_eq!(candidates, vec![TextCandidate::new("TN38AB1234", 0.91)]);

        let other = OcrRequest {
            track_id: 8,
            ..request
        };
        assert!(reader.read(&other).unwrap().is_empty());
    }

    #[test]
    fn test_candidates_outside_allowlist_are_dropped() {
        let file = write_recording(&[
            r#"{"frame": 3, "plates": {"7": [{"text": "tn38ab1234", "score": 0.95}, {"text": "TN38 AB1234", "score": 0.8}, {"text": "TN-38", "score": 0.7}]}}"#,
        ]);
        let mut reader = ReplayPlateReader::new(load_recording(file.path()).unwrap());
        let region = RgbImage::new(2, 2);
        let request = OcrRequest {
            track_id: 7,
            frame_index: 3,
            region: &region,
            allowlist: "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789",
        };

        let texts: Vec<String> = reader.read(&request).unwrap().into_iter().map(|c| c.text).collect();
        assert_eq!(texts, vec!["TN38 AB1234"]);

        let open = OcrRequest { allowlist: "", ..request };
        assert_eq!(reader.read(&open).unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_line_reports_position() {
        let file = write_recording(&[r#"{"frame": 1}"#, "not json"]);
        let err = load_recording(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }
}
