//! Traffic Sentinel - Traffic violation detection over stored streams
//!
//! Consumes tracked objects and plate reads from external collaborators, keeps
//! per-track state, and reports each distinct violation once with evidence.

mod analysis;
mod app;
mod capture;
mod config;
mod overlay;
mod reporting;
mod shared;
mod storage;
mod vision;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::app::{mjpeg_part, TrafficSentinelApp};
use crate::config::AppConfig;
use crate::storage::StreamError;

/// Traffic Sentinel - traffic violation detection
#[derive(Parser, Debug)]
#[command(name = "traffic-sentinel")]
#[command(about = "Detects and reports traffic violations in stored streams")]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store an input and print its stream id
    Ingest {
        /// Input file (animated GIF or still image)
        file: PathBuf,

        /// Recorded tracks (JSON lines) produced by the detector run
        #[arg(long)]
        tracks: Option<PathBuf>,
    },
    /// Process a stored stream and write the annotated MJPEG feed
    Watch {
        /// Stream id returned by `ingest`
        stream_id: String,

        /// Output file (defaults to <evidence_dir>/<stream_id>.mjpeg)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("traffic_sentinel=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = load_or_create_config(args.config.as_deref())?;
    config.apply_env();

    let app = TrafficSentinelApp::new(config)?;

    match args.command {
        Command::Ingest { file, tracks } => {
            let stored = app.ingest(&file, tracks.as_deref())?;
            info!("Stored {:?} as {}", stored.path, stored.id);
            println!("{}", stored.id);
        }
        Command::Watch { stream_id, output } => {
            let output = output.unwrap_or_else(|| {
                app.config()
                    .storage
                    .evidence_dir
                    .join(format!("{stream_id}.mjpeg"))
            });
            if let Err(e) = watch(&app, &stream_id, &output) {
                if let Some(StreamError::NotFound(id)) = e.downcast_ref::<StreamError>() {
                    error!("No stream with id {}", id);
                }
                app.shutdown();
                return Err(e);
            }
        }
    }

    app.shutdown();
    info!("Traffic Sentinel shutdown complete");

    Ok(())
}

/// Run a live feed to completion, writing MJPEG parts to `output`
fn watch(app: &TrafficSentinelApp, stream_id: &str, output: &Path) -> Result<()> {
    let feed = app.live_feed(stream_id)?;

    let file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create {:?}", output))?;
    let mut out = std::io::BufWriter::new(file);

    let mut frames = 0usize;
    for jpeg in feed {
        out.write_all(&mjpeg_part(&jpeg?))?;
        frames += 1;
    }
    out.flush()?;

    info!("Wrote {} frames to {:?}", frames, output);
    Ok(())
}

/// Load configuration from `path`, the user config directory, or defaults
fn load_or_create_config(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            if let Ok(config) = config::load_config(&config_path) {
                info!("Loaded configuration from {:?}", config_path);
                return Ok(config);
            }
        } else if config::save_config(&AppConfig::default(), &config_path).is_ok() {
            info!("Wrote default configuration to {:?}", config_path);
        }
    }
    info!("Using default configuration");
    Ok(AppConfig::default())
}
