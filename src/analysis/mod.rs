//! Analysis Layer
//!
//! Turns tracked boxes into per-track state and violation events.

pub mod events;
pub mod rules;
pub mod speed;
pub mod tracks;

pub use events::{ViolationEvent, ViolationKind};
pub use rules::RuleEngine;
pub use tracks::TrackStateManager;
