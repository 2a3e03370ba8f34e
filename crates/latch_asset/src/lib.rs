//! Latch Asset Pipeline
//!
//! Byte-level asset input: draining streams of unknown length into exactly
//! sized buffers, driven by [`AssetSettings`].

pub mod settings;
pub mod stream;

pub use settings::AssetSettings;
pub use stream::{read_stream_fully, DEFAULT_INITIAL_CAPACITY};

use std::fs::File;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while loading asset data.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("invalid asset settings: {0}")]
    Settings(#[from] serde_json::Error),
}

/// Read a whole file, growing the buffer from the configured capacity.
pub fn load_bytes(path: impl AsRef<Path>, settings: &AssetSettings) -> Result<Vec<u8>, AssetError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let bytes = read_stream_fully(file, Some(settings.stream_initial_capacity))?;
    debug!(path = %path.display(), len = bytes.len(), "loaded asset bytes");
    Ok(bytes)
}
