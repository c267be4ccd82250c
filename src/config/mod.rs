//! Application Configuration
//!
//! Pipeline tuning, storage locations and reporting endpoints stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the backend endpoint
pub const BACKEND_URL_ENV: &str = "BACKEND_API_URL";

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Input and evidence locations
    pub storage: StorageConfig,
    /// Frame retention and resizing
    pub pipeline: PipelineConfig,
    /// Speed estimation
    pub speed: SpeedConfig,
    /// Violation rules
    pub rules: RulesConfig,
    /// Plate recognition policy
    pub ocr: OcrConfig,
    /// Violation reporting
    pub reporting: ReportingConfig,
    /// Frame annotation
    pub overlay: OverlaySettings,
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding ingested inputs and their sidecars
    pub upload_dir: PathBuf,
    /// Directory receiving evidence images and processed feeds
    pub evidence_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            evidence_dir: PathBuf::from("processed"),
        }
    }
}

/// Frame loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Process one of every N raw frames
    pub frame_skip: u32,
    /// Frames wider than this are downscaled (0 disables resizing)
    pub max_frame_width: u32,
    /// Frame rate assumed when the source does not report one
    pub default_fps: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_skip: 3,
            max_frame_width: 640,
            default_fps: 30.0,
        }
    }
}

impl PipelineConfig {
    /// Frame rate between two retained frames
    pub fn effective_fps(&self, nominal_fps: f64) -> f64 {
        nominal_fps / self.frame_skip.max(1) as f64
    }
}

/// Speed estimation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Metres per pixel
    pub pixel_scale: f64,
    /// Displacements below this many pixels read as stationary
    pub noise_gate_px: f64,
    /// Moving-average window length
    pub window: usize,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            pixel_scale: 0.05,
            noise_gate_px: 5.0,
            window: 5,
        }
    }
}

/// Violation rule thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Speed limit in km/h
    pub speed_limit_kmh: f64,
    /// Fraction of a person box that must lie inside the vehicle box
    pub overlap_ratio: f32,
    /// Riders allowed on one motorcycle
    pub max_riders: usize,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            speed_limit_kmh: 60.0,
            overlap_ratio: 0.5,
            max_riders: 2,
        }
    }
}

/// Plate recognition throttling and crop policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Frames between attempts while no plate is known
    pub first_attempt_gap: i64,
    /// Frames between attempts while the known plate is below `confident_score`
    pub retry_gap: i64,
    /// Score at which a plate is considered settled
    pub confident_score: f32,
    /// Minimum score for a plate that only passes the loose check
    pub fallback_min_score: f32,
    /// Bottom fraction of a four-wheeler box handed to the reader
    pub vehicle_crop_ratio: f64,
    /// Bottom fraction of a motorcycle box handed to the reader
    pub motorcycle_crop_ratio: f64,
    /// Margin added around the vehicle box, as a fraction of its size
    pub crop_margin: f64,
    /// Characters the reader may emit
    pub allowlist: String,
    /// Enhance crops before recognition
    pub preprocess: bool,
    /// Crops narrower than this are upscaled
    pub min_width: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            first_attempt_gap: 5,
            retry_gap: 10,
            confident_score: 0.8,
            fallback_min_score: 0.4,
            vehicle_crop_ratio: 0.4,
            motorcycle_crop_ratio: 0.6,
            crop_margin: 0.05,
            allowlist: "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789".to_string(),
            preprocess: true,
            min_width: 400,
        }
    }
}

/// Backend reporting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Endpoint receiving violation records
    pub backend_url: String,
    /// Per-request timeout
    pub timeout_ms: u64,
    /// Confidence attached to every record
    pub confidence: f32,
    /// How long shutdown waits for in-flight reports
    pub shutdown_grace_ms: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:3000/api/violations/internal/record".to_string(),
            timeout_ms: 2000,
            confidence: 0.95,
            shutdown_grace_ms: 5000,
        }
    }
}

/// Annotation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    /// TrueType/OpenType font used for labels; boxes only when unset
    pub font_path: Option<PathBuf>,
    /// Speeds at or below this are left off the label
    pub label_speed_min: f64,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            font_path: None,
            label_speed_min: 10.0,
        }
    }
}

impl AppConfig {
    /// Apply environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                self.reporting.backend_url = url;
            }
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
