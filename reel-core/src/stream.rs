//! Video stream resources.
//!
//! A [`VideoStream`] is a file binding, cheap to hold and clone. Each call
//! to [`VideoStream::instance_playback`] opens an independent playback.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{MediaBackend, SoftwareBackend};
use crate::demuxer::handles_path;
use crate::error::{PlaybackError, Result};
use crate::playback::VideoStreamPlayback;

/// Resource type name reported for files this crate can play.
pub const RESOURCE_TYPE: &str = "VideoStream";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStream {
    file: PathBuf,
    audio_track: usize,
}

impl VideoStream {
    pub fn new<P: Into<PathBuf>>(file: P) -> Self {
        Self {
            file: file.into(),
            audio_track: 0,
        }
    }

    pub fn set_file<P: Into<PathBuf>>(&mut self, file: P) {
        self.file = file.into();
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn set_audio_track(&mut self, track: usize) {
        self.audio_track = track;
    }

    pub fn audio_track(&self) -> usize {
        self.audio_track
    }

    /// Open a playback over the software backend. `None` if the file does
    /// not open.
    pub fn instance_playback(&self) -> Option<VideoStreamPlayback> {
        self.instance_playback_with(Arc::new(SoftwareBackend::new()))
    }

    pub fn instance_playback_with(&self, backend: Arc<dyn MediaBackend>) -> Option<VideoStreamPlayback> {
        let mut playback = VideoStreamPlayback::with_backend(backend);
        playback.set_audio_track(self.audio_track);
        if playback.open_file(&self.file) {
            Some(playback)
        } else {
            None
        }
    }
}

/// Turns paths into [`VideoStream`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamLoader;

impl StreamLoader {
    /// Bind a stream to `path` after checking it is a container we route
    /// and that it can be opened for reading.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<VideoStream> {
        let path = path.as_ref();
        if !handles_path(path) {
            return Err(PlaybackError::UnrecognizedExtension(path.to_path_buf()));
        }
        std::fs::File::open(path).map_err(|e| PlaybackError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(VideoStream::new(path))
    }

    pub fn resource_type<P: AsRef<Path>>(&self, path: P) -> Option<&'static str> {
        handles_path(path.as_ref()).then_some(RESOURCE_TYPE)
    }

    pub fn recognized_extensions(&self) -> &'static [&'static str] {
        crate::demuxer::recognized_extensions()
    }
}
