//! Error types shared across the playback pipeline.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to open {path:?}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("Container has no video track")]
    NoVideoTrack,
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),
    #[error("Decoder init failed: {0}")]
    DecoderInit(String),
    #[error("Demux error: {0}")]
    Demux(String),
    #[error("Invalid config: {0}")]
    Config(String),
    #[error("Unrecognized extension: {0:?}")]
    UnrecognizedExtension(PathBuf),
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
