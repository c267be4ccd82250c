//! Violation rules
//!
//! Stateless checks over one frame's geometry. Each rule fires independently;
//! a single track can raise several kinds in the same frame.

use crate::analysis::events::ViolationKind;
use crate::config::RulesConfig;
use crate::vision::{BoundingBox, ObjectClass, TrackedObject};

/// A rule that fired for a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredRule {
    pub kind: ViolationKind,
    /// Placeholder rule standing in for a missing classifier
    pub heuristic: bool,
}

/// Count candidates lying mostly inside `reference`
///
/// A candidate counts when its intersection with `reference` exceeds `ratio`
/// of the candidate's own area, not the reference's.
pub fn occupancy_overlap_count(reference: &BoundingBox, candidates: &[BoundingBox], ratio: f32) -> usize {
    candidates
        .iter()
        .filter(|candidate| {
            let inter = reference.intersection_area(candidate);
            inter > 0.0 && inter > ratio * candidate.area()
        })
        .count()
}

/// Evaluates every rule for one vehicle
#[derive(Debug, Clone)]
pub struct RuleEngine {
    settings: RulesConfig,
}

impl RuleEngine {
    pub fn new(settings: RulesConfig) -> Self {
        Self { settings }
    }

    /// Cars, buses and trucks over the limit; motorcycles never qualify
    pub fn is_overspeeding(&self, class: ObjectClass, speed: f64) -> bool {
        class.is_four_wheeler() && speed > self.settings.speed_limit_kmh
    }

    /// More riders than allowed on a motorcycle
    pub fn is_triple_riding(&self, riders: usize) -> bool {
        riders > self.settings.max_riders
    }

    /// Any rider on a motorcycle.
    ///
    /// Stand-in for a helmet classifier: every occupied motorcycle is flagged,
    /// compliant or not. Replace with a real classifier before relying on it.
    pub fn is_missing_helmet(&self, riders: usize) -> bool {
        riders >= 1
    }

    /// Rules fired for `vehicle` given its smoothed speed and the frame's people
    pub fn evaluate(&self, vehicle: &TrackedObject, speed: f64, persons: &[BoundingBox]) -> Vec<FiredRule> {
        let mut fired = Vec::new();

        if self.is_overspeeding(vehicle.class, speed) {
            fired.push(FiredRule {
                kind: ViolationKind::Overspeeding,
                heuristic: false,
            });
        }

        if vehicle.class == ObjectClass::Motorcycle {
            let riders = occupancy_overlap_count(&vehicle.bbox, persons, self.settings.overlap_ratio);

            if self.is_triple_riding(riders) {
                fired.push(FiredRule {
                    kind: ViolationKind::TripleRiding,
                    heuristic: false,
                });
            }
            if self.is_missing_helmet(riders) {
                fired.push(FiredRule {
                    kind: ViolationKind::NoHelmet,
                    heuristic: true,
                });
            }
        }

        fired
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(RulesConfig::default())
    }
}
