//! Media backend - where the engine gets its reader, demuxer and decoders.
//!
//! The engine holds a [`MediaBackend`] and never names a concrete decoder.
//! [`SoftwareBackend`] is the pure-Rust stack; tests swap in scripted ones.

use std::path::Path;

use crate::decode::{create_video_decoder, AudioDecoder, VideoDecoder};
use crate::demuxer::{CodecInfo, Demuxer};
use crate::error::{PlaybackError, Result};
use crate::mkv::MkvDemuxer;
use crate::reader::{ContainerReader, FileReader};

pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;

    fn open_reader(&self, path: &Path) -> Result<Box<dyn ContainerReader>>;

    /// `audio_track` counts audio tracks only, from zero.
    fn open_demuxer(
        &self,
        reader: Box<dyn ContainerReader>,
        audio_track: usize,
    ) -> Result<Box<dyn Demuxer>>;

    fn open_video_decoder(
        &self,
        demuxer: &dyn Demuxer,
        threads: usize,
    ) -> Result<Box<dyn VideoDecoder>>;

    fn open_audio_decoder(&self, demuxer: &dyn Demuxer) -> Result<Box<dyn AudioDecoder>>;
}

/// Matroska via `matroska-demuxer`, H.264 via OpenH264, audio via Symphonia.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareBackend;

impl SoftwareBackend {
    pub fn new() -> Self {
        Self
    }
}

impl MediaBackend for SoftwareBackend {
    fn name(&self) -> &str {
        "software"
    }

    fn open_reader(&self, path: &Path) -> Result<Box<dyn ContainerReader>> {
        let reader = FileReader::open(path).map_err(|e| PlaybackError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(reader))
    }

    fn open_demuxer(
        &self,
        reader: Box<dyn ContainerReader>,
        audio_track: usize,
    ) -> Result<Box<dyn Demuxer>> {
        Ok(Box::new(MkvDemuxer::open(reader, audio_track)?))
    }

    fn open_video_decoder(
        &self,
        demuxer: &dyn Demuxer,
        threads: usize,
    ) -> Result<Box<dyn VideoDecoder>> {
        create_video_decoder(demuxer.video_codec(), demuxer.width(), demuxer.height(), threads)
    }

    fn open_audio_decoder(&self, demuxer: &dyn Demuxer) -> Result<Box<dyn AudioDecoder>> {
        let codec = demuxer.audio_codec().ok_or_else(|| {
            PlaybackError::UnsupportedCodec("no audio track".to_string())
        })?;
        open_audio(codec, demuxer.channels(), demuxer.sample_rate())
    }
}

#[cfg(feature = "audio")]
fn open_audio(codec: &CodecInfo, channels: u32, sample_rate: u32) -> Result<Box<dyn AudioDecoder>> {
    Ok(Box::new(crate::audio::SymphoniaAudioDecoder::new(
        codec,
        channels,
        sample_rate,
    )?))
}

#[cfg(not(feature = "audio"))]
fn open_audio(codec: &CodecInfo, _channels: u32, _sample_rate: u32) -> Result<Box<dyn AudioDecoder>> {
    Err(PlaybackError::UnsupportedCodec(format!(
        "{} (built without audio)",
        codec.codec_id
    )))
}
