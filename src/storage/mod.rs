//! Storage Layer
//!
//! Ingested stream inputs and violation evidence on the local filesystem.

pub mod evidence;
pub mod streams;

pub use evidence::EvidenceStore;
pub use streams::{StoredStream, StreamError, StreamStore};

use anyhow::Result;
use std::path::PathBuf;

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "trafficsentinel", "TrafficSentinel")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}
