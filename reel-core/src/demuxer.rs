//! Demuxer contract and container routing.
//!
//! A demuxer splits the container into video and audio packets. The engine
//! reads packets in pairs through [`Demuxer::read_frame`] and never looks
//! inside them.

use std::path::Path;

/// Containers this engine accepts, matched on the lowercase extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    WebM,
    Mkv,
}

impl ContainerKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "webm" => Some(Self::WebM),
            "mkv" => Some(Self::Mkv),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::WebM => "webm",
            Self::Mkv => "mkv",
        }
    }
}

pub fn recognized_extensions() -> &'static [&'static str] {
    &["webm", "mkv"]
}

pub fn handles_path(path: &Path) -> bool {
    ContainerKind::from_path(path).is_some()
}

// ============================================================================
// Stream metadata
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    /// Audio channel count, 0 without an audio track
    pub channels: u32,
    pub sample_rate: u32,
    /// Seconds
    pub duration: f64,
}

/// What a decoder needs to know about its track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecInfo {
    /// Matroska codec id, e.g. `V_MPEG4/ISO/AVC` or `A_VORBIS`
    pub codec_id: String,
    pub codec_private: Option<Vec<u8>>,
    pub bit_depth: Option<u32>,
}

// ============================================================================
// Packet
// ============================================================================

/// One compressed unit from the container.
///
/// Packets are slots: the demuxer refills them in place and the engine
/// recycles them, so `data` keeps its allocation across the stream.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    pub data: Vec<u8>,
    /// Presentation time in seconds
    pub time: f64,
    pub keyframe: bool,
    valid: bool,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
        self.data.clear();
    }

    pub fn fill(&mut self, data: &[u8], time: f64, keyframe: bool) {
        self.data.clear();
        self.data.extend_from_slice(data);
        self.time = time;
        self.keyframe = keyframe;
        self.valid = true;
    }
}

// ============================================================================
// Demuxer trait
// ============================================================================

pub trait Demuxer {
    fn info(&self) -> &StreamInfo;

    fn video_codec(&self) -> &CodecInfo;

    /// `None` when the container has no audio track at the requested index.
    fn audio_codec(&self) -> Option<&CodecInfo>;

    /// Read the next packet into `video` or `audio`.
    ///
    /// Both slots are invalidated first; on success exactly one of them is
    /// filled. Returns false at end of stream or on a hard read error.
    fn read_frame(&mut self, video: &mut Packet, audio: Option<&mut Packet>) -> bool;

    fn is_end_of_stream(&self) -> bool;

    fn width(&self) -> u32 {
        self.info().width
    }

    fn height(&self) -> u32 {
        self.info().height
    }

    fn channels(&self) -> u32 {
        self.info().channels
    }

    fn sample_rate(&self) -> u32 {
        self.info().sample_rate
    }

    fn duration(&self) -> f64 {
        self.info().duration
    }
}
