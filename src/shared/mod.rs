//! Messaging between the frame loop and the reporting workers
//!
//! The frame loop only ever sends owned snapshots; nothing here is shared
//! mutably across threads.

pub mod messages;

pub use messages::{ReportCommand, ViolationReport};
