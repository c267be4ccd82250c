//! Non-blocking violation reporting
//!
//! The frame loop claims `(track, kind)` pairs on `TrackStateManager` and
//! pushes an owned `ViolationReport` onto a channel. A dispatcher thread owns
//! a tokio runtime and spawns one delivery task per report: write the evidence
//! image, then post the record. Delivery failures are logged and dropped.

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use futures_util::future::join_all;
use image::RgbImage;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::analysis::{TrackStateManager, ViolationEvent};
use crate::config::ReportingConfig;
use crate::reporting::backend::{ViolationBackend, ViolationRecord};
use crate::shared::{ReportCommand, ViolationReport};
use crate::storage::EvidenceStore;

/// Handle used by the frame loop to dispatch reports
pub struct ReportingPipeline {
    sender: Mutex<Option<Sender<ReportCommand>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl ReportingPipeline {
    /// Start the dispatcher thread
    pub fn start(
        backend: Arc<dyn ViolationBackend>,
        evidence: EvidenceStore,
        settings: ReportingConfig,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("violation-report")
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")?;
        let (sender, receiver) = unbounded();

        let dispatcher = std::thread::Builder::new()
            .name("report-dispatcher".to_string())
            .spawn(move || {
                debug!("Report dispatcher starting...");
                run_dispatcher(runtime, receiver, backend, evidence, settings);
                debug!("Report dispatcher exiting...");
            })
            .context("Failed to spawn report dispatcher")?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Dispatch `event` unless its `(track, kind)` pair was already reported
    ///
    /// The pair is marked before the report is delivered. `snapshot` is copied
    /// so the caller may reuse its buffer immediately.
    pub fn report_if_new(
        &self,
        tracks: &mut TrackStateManager,
        stream_id: &str,
        event: &ViolationEvent,
        snapshot: &RgbImage,
    ) -> bool {
        if !tracks.claim_violation(event.track_id, event.kind) {
            return false;
        }

        info!(
            track_id = event.track_id,
            kind = %event.kind,
            speed = event.speed,
            heuristic = event.heuristic,
            "New violation"
        );

        let report = ViolationReport::from_event(stream_id, event, snapshot.clone());
        match &*self.sender.lock() {
            Some(sender) => {
                if sender.send(ReportCommand::Submit(Box::new(report))).is_err() {
                    warn!("Report dispatcher is gone; dropping {} for track {}", event.kind, event.track_id);
                }
            }
            None => warn!("Reporting already shut down; dropping {} for track {}", event.kind, event.track_id),
        }
        true
    }

    /// Stop accepting reports and wait for in-flight deliveries
    pub fn shutdown(&self) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(ReportCommand::Shutdown);
        }
        let dispatcher = self.dispatcher.lock().take();
        if let Some(handle) = dispatcher {
            if handle.join().is_err() {
                error!("Report dispatcher panicked");
            }
        }
    }
}

impl Drop for ReportingPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_dispatcher(
    runtime: tokio::runtime::Runtime,
    receiver: Receiver<ReportCommand>,
    backend: Arc<dyn ViolationBackend>,
    evidence: EvidenceStore,
    settings: ReportingConfig,
) {
    let mut in_flight = Vec::new();

    for command in receiver.iter() {
        match command {
            ReportCommand::Submit(report) => {
                in_flight.retain(|task: &tokio::task::JoinHandle<()>| !task.is_finished());
                in_flight.push(runtime.spawn(deliver(
                    *report,
                    backend.clone(),
                    evidence.clone(),
                    settings.confidence,
                )));
            }
            ReportCommand::Shutdown => break,
        }
    }

    if in_flight.is_empty() {
        return;
    }

    let pending = in_flight.len();
    let grace = Duration::from_millis(settings.shutdown_grace_ms);
    let drained = runtime.block_on(async { tokio::time::timeout(grace, join_all(in_flight)).await });
    match drained {
        Ok(_) => debug!("Drained {} in-flight reports", pending),
        Err(_) => warn!("Gave up on in-flight reports after {:?}", grace),
    }
    runtime.shutdown_background();
}

/// Write evidence, then notify the backend
async fn deliver(
    report: ViolationReport,
    backend: Arc<dyn ViolationBackend>,
    evidence: EvidenceStore,
    confidence: f32,
) {
    let track_id = report.track_id;
    let kind = report.kind;

    let saved = tokio::task::spawn_blocking(move || {
        let name = evidence.save(&report);
        (report, name)
    })
    .await;

    let (report, evidence_image) = match saved {
        Ok((report, Ok(name))) => (report, name),
        Ok((_, Err(e))) => {
            warn!("Failed to save evidence for {} on track {}: {:#}", kind, track_id, e);
            return;
        }
        Err(e) => {
            error!("Evidence task failed for {} on track {}: {}", kind, track_id, e);
            return;
        }
    };

    let record = ViolationRecord::from_report(&report, evidence_image, confidence);
    match backend.submit(&record).await {
        Ok(()) => info!("Reported {} for track {}", kind, track_id),
        Err(e) => warn!("Failed to report violation: {:#}", e),
    }
}
