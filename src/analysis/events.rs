//! Violation kinds and events
//!
//! Events are built and consumed within the processing of a single frame.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::vision::ObjectClass;

/// Kinds of violation the rules can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ViolationKind {
    Overspeeding,
    TripleRiding,
    /// Occupied-motorcycle stand-in for a helmet classifier
    NoHelmet,
}

impl ViolationKind {
    /// Label sent to the backend and drawn on frames
    pub fn label(&self) -> &'static str {
        match self {
            ViolationKind::Overspeeding => "OVERSPEEDING",
            ViolationKind::TripleRiding => "TRIPLE RIDING",
            ViolationKind::NoHelmet => "NO HELMET",
        }
    }

    /// File-name safe form of the label
    pub fn slug(&self) -> &'static str {
        match self {
            ViolationKind::Overspeeding => "OVERSPEEDING",
            ViolationKind::TripleRiding => "TRIPLE_RIDING",
            ViolationKind::NoHelmet => "NO_HELMET",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A violation raised for a track in the current frame
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationEvent {
    pub track_id: u32,
    pub kind: ViolationKind,
    /// Smoothed speed in km/h
    pub speed: f64,
    /// Best plate known for the track, if any
    pub plate_guess: Option<String>,
    pub vehicle_class: ObjectClass,
    /// Raised by a placeholder rule rather than a real classifier
    pub heuristic: bool,
}

impl ViolationEvent {
    /// Plate text for records, with a per-track placeholder when unknown
    pub fn vehicle_number(&self) -> String {
        match &self.plate_guess {
            Some(plate) if !plate.is_empty() => plate.clone(),
            _ => format!("UNKNOWN-{}", self.track_id),
        }
    }
}
