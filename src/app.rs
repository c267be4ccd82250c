//! Application Coordinator
//!
//! `FrameOrchestrator` runs the per-frame pipeline for one stream: track
//! update, rules, plate recognition, annotation, then reporting.
//! `TrafficSentinelApp` owns the stream store and the shared reporting
//! pipeline, and hands out live feeds over stored streams.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analysis::{RuleEngine, TrackStateManager, ViolationEvent, ViolationKind};
use crate::capture::frame::Frame;
use crate::capture::{fit_width, is_retained, FrameSource};
use crate::config::{AppConfig, PipelineConfig};
use crate::overlay::{Annotator, VehicleAnnotation};
use crate::reporting::{HttpBackend, ReportingPipeline, ViolationBackend};
use crate::storage::{EvidenceStore, StoredStream, StreamStore};
use crate::vision::replay::load_recording;
use crate::vision::{DetectionFrame, ObjectTracker, PlateReader, ReplayPlateReader, ReplayTracker};

const JPEG_QUALITY: u8 = 80;

/// Result of processing one retained frame
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// Raw frame sequence number
    pub index: u64,
    /// Annotated image
    pub image: RgbImage,
    /// Every violation that fired this frame, reported or not
    pub violations: Vec<ViolationEvent>,
}

/// Per-stream frame pipeline
pub struct FrameOrchestrator {
    stream_id: String,
    pipeline: PipelineConfig,
    nominal_fps: f64,
    tracker: Box<dyn ObjectTracker>,
    reader: Box<dyn PlateReader>,
    tracks: TrackStateManager,
    rules: RuleEngine,
    annotator: Annotator,
    reporter: Arc<ReportingPipeline>,
}

impl FrameOrchestrator {
    pub fn new(
        stream_id: impl Into<String>,
        config: &AppConfig,
        nominal_fps: f64,
        tracker: Box<dyn ObjectTracker>,
        reader: Box<dyn PlateReader>,
        annotator: Annotator,
        reporter: Arc<ReportingPipeline>,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            pipeline: config.pipeline.clone(),
            nominal_fps,
            tracker,
            reader,
            tracks: TrackStateManager::new(config.speed.clone(), config.ocr.clone()),
            rules: RuleEngine::new(config.rules.clone()),
            annotator,
            reporter,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Resize, track and process one retained frame
    pub fn process_frame(&mut self, frame: Frame) -> ProcessedFrame {
        let frame = Frame {
            image: fit_width(frame.image, self.pipeline.max_frame_width),
            ..frame
        };

        debug!(frame = frame.index, at = ?frame.timestamp, "Processing frame");
        let objects = match self.tracker.track(&frame) {
            Ok(objects) => objects,
            Err(e) => {
                warn!(frame = frame.index, "Tracker failed: {:#}", e);
                Vec::new()
            }
        };
        let detections = DetectionFrame::new(frame.index, self.nominal_fps, objects);
        self.process_detections(frame, &detections)
    }

    /// Update tracks and rules for one frame's detections
    ///
    /// Violations are reported after every vehicle is drawn so the evidence
    /// carries the fully annotated frame.
    pub fn process_detections(&mut self, frame: Frame, detections: &DetectionFrame) -> ProcessedFrame {
        let effective_fps = self.pipeline.effective_fps(detections.nominal_fps);
        let persons = detections.person_boxes();
        let mut annotated = frame.image.clone();
        let mut violations = Vec::new();

        for vehicle in detections.vehicles() {
            let speed = self.tracks.observe(vehicle, effective_fps);
            let fired = self.rules.evaluate(vehicle, speed, &persons);

            let attempt = self
                .tracks
                .refresh_plate(vehicle, frame.index, &frame.image, self.reader.as_mut());
            debug!(track_id = vehicle.track_id, speed, ?attempt, "Vehicle updated");

            let plate = self
                .tracks
                .best_plate(vehicle.track_id)
                .map(|p| p.text.clone());
            let kinds: Vec<ViolationKind> = fired.iter().map(|f| f.kind).collect();

            self.annotator.annotate(
                &mut annotated,
                &VehicleAnnotation {
                    bbox: vehicle.bbox,
                    plate: plate.as_deref(),
                    speed,
                    violations: &kinds,
                },
            );

            violations.extend(fired.into_iter().map(|rule| ViolationEvent {
                track_id: vehicle.track_id,
                kind: rule.kind,
                speed,
                plate_guess: plate.clone(),
                vehicle_class: vehicle.class,
                heuristic: rule.heuristic,
            }));
        }

        debug!(
            frame = detections.sequence,
            tracks = self.tracks.len(),
            violations = violations.len(),
            "Frame processed"
        );
        for event in &violations {
            self.reporter
                .report_if_new(&mut self.tracks, &self.stream_id, event, &annotated);
        }

        ProcessedFrame {
            index: frame.index,
            image: annotated,
            violations,
        }
    }
}

/// Annotated JPEG frames over one stored stream
///
/// Only one of every `frame_skip` raw frames is processed and yielded; a
/// still input's single frame always is.
/// Iteration ends when the input is exhausted or fails to decode.
pub struct LiveFeed {
    source: Box<dyn FrameSource>,
    orchestrator: FrameOrchestrator,
    frame_skip: u32,
    finished: bool,
}

impl LiveFeed {
    pub fn new(source: Box<dyn FrameSource>, orchestrator: FrameOrchestrator, frame_skip: u32) -> Self {
        Self {
            source,
            orchestrator,
            frame_skip,
            finished: false,
        }
    }

    /// Next processed frame, or `None` once the input is exhausted
    pub fn next_processed(&mut self) -> Result<Option<ProcessedFrame>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.finished = true;
                    info!("Stream {} exhausted", self.orchestrator.stream_id());
                    return Ok(None);
                }
                Err(e) => {
                    self.finished = true;
                    return Err(e).context("Failed to decode frame");
                }
            };

            if self.source.is_still() || is_retained(frame.index, self.frame_skip) {
                let processed = self.orchestrator.process_frame(frame);
                if !processed.violations.is_empty() {
                    info!(
                        frame = processed.index,
                        count = processed.violations.len(),
                        "Violations on frame"
                    );
                }
                return Ok(Some(processed));
            }
        }
    }
}

impl Iterator for LiveFeed {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_processed() {
            Ok(Some(processed)) => Some(encode_jpeg(&processed.image)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Encode a frame as JPEG
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(image)
        .context("Failed to encode frame")?;
    Ok(buf)
}

/// Wrap one JPEG as a multipart/x-mixed-replace part
pub fn mjpeg_part(jpeg: &[u8]) -> Vec<u8> {
    let mut part = Vec::with_capacity(jpeg.len() + 48);
    part.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// Main application coordinator
pub struct TrafficSentinelApp {
    config: AppConfig,
    store: StreamStore,
    reporter: Arc<ReportingPipeline>,
}

impl TrafficSentinelApp {
    /// Create the coordinator with the HTTP backend from `config`
    pub fn new(config: AppConfig) -> Result<Self> {
        let backend = Arc::new(HttpBackend::new(&config.reporting)?);
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: AppConfig, backend: Arc<dyn ViolationBackend>) -> Result<Self> {
        let store = StreamStore::new(&config.storage.upload_dir)?;
        let evidence = EvidenceStore::new(&config.storage.evidence_dir)?;
        let reporter = Arc::new(ReportingPipeline::start(backend, evidence, config.reporting.clone())?);

        info!(
            "Uploads in {:?}, evidence in {:?}, reporting to {}",
            config.storage.upload_dir, config.storage.evidence_dir, config.reporting.backend_url
        );

        Ok(Self {
            config,
            store,
            reporter,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Store an input (and optional recorded tracks) under a new stream id
    pub fn ingest(&self, path: &Path, tracks: Option<&Path>) -> Result<StoredStream> {
        Ok(self.store.ingest_file(path, tracks)?)
    }

    /// Open a live feed over a stored stream
    ///
    /// Unknown ids fail with `StreamError::NotFound`, undecodable inputs with
    /// `StreamError::Unreadable`.
    pub fn live_feed(&self, stream_id: &str) -> Result<LiveFeed> {
        let opened = self.store.open(stream_id, self.config.pipeline.default_fps)?;

        let recording = match &opened.tracks {
            Some(path) => load_recording(path)?,
            None => {
                warn!("No recorded tracks for {}; frames pass through unannotated", stream_id);
                Arc::new(BTreeMap::new())
            }
        };

        let annotator = Annotator::new(&self.config.overlay)?;
        let orchestrator = FrameOrchestrator::new(
            opened.id,
            &self.config,
            opened.source.nominal_fps(),
            Box::new(ReplayTracker::new(recording.clone())),
            Box::new(ReplayPlateReader::new(recording)),
            annotator,
            self.reporter.clone(),
        );

        info!("Starting stream {} from {:?}", stream_id, opened.path);
        Ok(LiveFeed::new(opened.source, orchestrator, self.config.pipeline.frame_skip))
    }

    /// Drain in-flight reports
    pub fn shutdown(&self) {
        self.reporter.shutdown();
    }
}

impl Drop for TrafficSentinelApp {
    fn drop(&mut self) {
        self.reporter.shutdown();
    }
}
