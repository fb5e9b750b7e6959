//! # Playback Configuration
//!
//! Settings the host hands to the engine. Loaded from JSON or built in code.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PlaybackError, Result};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Shift applied to the clock for both the lookahead test and the
    /// presentation gate, in milliseconds. Converted to seconds at `play`.
    pub delay_compensation_ms: f64,

    /// Zero-based index among the container's audio tracks.
    pub audio_track: usize,

    /// Worker threads offered to the video decoder. `None` means one per
    /// available processor.
    pub decode_threads: Option<usize>,

    /// Emit the one-time warning when `seek` is called.
    pub warn_on_seek: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            delay_compensation_ms: 0.0,
            audio_track: 0,
            decode_threads: None,
            warn_on_seek: true,
        }
    }
}

impl PlaybackConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PlaybackError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Delay compensation in seconds.
    pub fn delay_compensation_secs(&self) -> f64 {
        self.delay_compensation_ms / 1000.0
    }

    /// Thread count to hand the video decoder.
    pub fn resolved_decode_threads(&self) -> usize {
        match self.decode_threads {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.delay_compensation_ms.is_finite() {
            return Err(PlaybackError::Config(
                "delay_compensation_ms must be finite".to_string(),
            ));
        }
        Ok(())
    }
}
