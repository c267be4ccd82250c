//! Stored stream inputs
//!
//! Ingested inputs live in the upload directory as `{id}.{ext}`, with an
//! optional recorded-tracks sidecar `{id}.tracks.jsonl` next to them.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::capture::{self, FrameSource};

/// Suffix of the recorded-tracks sidecar
pub const TRACKS_SUFFIX: &str = ".tracks.jsonl";

/// Errors raised while storing or opening streams
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Stream not found: {0}")]
    NotFound(String),

    #[error("Could not open stream {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A stored input and its identifier
#[derive(Debug, Clone, PartialEq)]
pub struct StoredStream {
    pub id: String,
    pub path: PathBuf,
}

/// A stored input opened for decoding
pub struct OpenedStream {
    pub id: String,
    pub path: PathBuf,
    pub source: Box<dyn FrameSource>,
    /// Recorded tracks, if ingested with a sidecar
    pub tracks: Option<PathBuf>,
}

/// Upload directory holding ingested inputs
#[derive(Debug, Clone)]
pub struct StreamStore {
    upload_dir: PathBuf,
}

impl StreamStore {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Result<Self, StreamError> {
        let upload_dir = upload_dir.into();
        fs::create_dir_all(&upload_dir)?;
        Ok(Self { upload_dir })
    }

    /// Persist `reader` under a fresh identifier derived from `file_name`
    pub fn ingest_reader(&self, file_name: &str, reader: &mut impl Read) -> Result<StoredStream, StreamError> {
        let name = Path::new(file_name);
        let id = generate_id(name);
        let ext = name
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| "bin".to_string());

        let path = self.upload_dir.join(format!("{id}.{ext}"));
        let mut out = File::create(&path)?;
        let bytes = io::copy(reader, &mut out)?;

        info!("Stored stream {} ({} bytes) at {:?}", id, bytes, path);
        Ok(StoredStream { id, path })
    }

    /// Copy a file (and optionally its recorded tracks) into the store
    pub fn ingest_file(&self, path: &Path, tracks: Option<&Path>) -> Result<StoredStream, StreamError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("stream");
        let mut input = File::open(path)?;
        let stored = self.ingest_reader(file_name, &mut input)?;

        if let Some(tracks) = tracks {
            let sidecar = self.sidecar_path(&stored.id);
            fs::copy(tracks, &sidecar)?;
            debug!("Stored recorded tracks for {} at {:?}", stored.id, sidecar);
        }

        Ok(stored)
    }

    /// Find the stored input for `id`
    pub fn locate(&self, id: &str) -> Result<PathBuf, StreamError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(StreamError::NotFound(id.to_string()));
        }

        let prefix = format!("{id}.");
        let mut matches: Vec<PathBuf> = fs::read_dir(&self.upload_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                (name.starts_with(&prefix) && !name.ends_with(TRACKS_SUFFIX)).then(|| entry.path())
            })
            .collect();
        matches.sort();

        matches
            .into_iter()
            .next()
            .ok_or_else(|| StreamError::NotFound(id.to_string()))
    }

    /// Recorded tracks for `id`, if present
    pub fn tracks_for(&self, id: &str) -> Option<PathBuf> {
        let path = self.sidecar_path(id);
        path.is_file().then_some(path)
    }

    /// Locate and open `id` for decoding
    pub fn open(&self, id: &str, default_fps: f64) -> Result<OpenedStream, StreamError> {
        let path = self.locate(id)?;
        let source = capture::open_source(&path, default_fps).map_err(|source| StreamError::Unreadable {
            path: path.clone(),
            source,
        })?;

        Ok(OpenedStream {
            id: id.to_string(),
            tracks: self.tracks_for(id),
            path,
            source,
        })
    }

    fn sidecar_path(&self, id: &str) -> PathBuf {
        self.upload_dir.join(format!("{id}{TRACKS_SUFFIX}"))
    }
}

/// `{stem}_{unique}` with the stem reduced to file-name safe characters
fn generate_id(name: &Path) -> String {
    let stem: String = name
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("stream")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = if stem.is_empty() { "stream".to_string() } else { stem };

    format!("{}_{}", stem, uuid::Uuid::new_v4().simple())
}
