//! # Reel Core
//!
//! Tick-driven video stream playback: Matroska in, RGBA frames and f32 PCM
//! out. The host owns the clock, the texture and the mixer; the engine
//! only hands them finished data.

// ============================================================================
// Container
// ============================================================================
pub mod reader;
pub mod demuxer;
pub mod mkv;

// ============================================================================
// Decoders
// ============================================================================
pub mod decode;
pub mod h264_utils;
#[cfg(feature = "audio")]
pub mod audio;
pub mod backend;

// ============================================================================
// Media Processing
// ============================================================================
pub mod pixel_convert;
pub mod frame_queue;
pub mod sync;

// ============================================================================
// Playback
// ============================================================================
pub mod config;
pub mod error;
pub mod playback;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{MediaBackend, SoftwareBackend};
pub use config::PlaybackConfig;
pub use error::{PlaybackError, Result};
pub use pixel_convert::RgbaFrame;
pub use playback::{MixCallback, PlaybackState, PlaybackStats, TextureSink, VideoStreamPlayback};
pub use stream::{StreamLoader, VideoStream};

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
