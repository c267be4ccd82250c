//! Evidence images

use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use std::path::PathBuf;
use tracing::debug;

use crate::shared::ViolationReport;

/// Directory receiving one JPEG per reported violation
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    dir: PathBuf,
}

impl EvidenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create evidence directory {:?}", dir))?;
        Ok(Self { dir })
    }

    /// Write the report's frame, returning the file name used
    pub fn save(&self, report: &ViolationReport) -> Result<String> {
        let name = report.evidence_file_name();
        self.write_jpeg(&name, &report.frame)?;
        Ok(name)
    }

    fn write_jpeg(&self, name: &str, image: &RgbImage) -> Result<()> {
        let path = self.dir.join(name);
        image
            .save_with_format(&path, ImageFormat::Jpeg)
            .with_context(|| format!("Failed to write evidence {:?}", path))?;
        debug!("Saved evidence to {:?}", path);
        Ok(())
    }
}
