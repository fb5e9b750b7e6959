//! # Video Stream Playback
//!
//! Tick-driven engine. The host calls [`VideoStreamPlayback::update`] once
//! per frame with the elapsed time; everything (demux, decode, sync,
//! convert, present, audio mixing) happens synchronously inside that call.
//!
//! ```text
//!  update(delta)
//!    │ clock += delta
//!    ├─ drain leftover PCM ──────────────▶ mix callback
//!    ├─ fill: decode staged audio ───────▶ mix callback
//!    │        read_frame ─▶ pending queue
//!    ├─ present: decode head ─▶ gate ─▶ convert ─▶ texture sink
//!    └─ queue empty + end of stream ─▶ stop()
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{MediaBackend, SoftwareBackend};
use crate::config::PlaybackConfig;
use crate::decode::{AudioDecoder, ImageError, VideoDecoder};
use crate::demuxer::{Demuxer, Packet};
use crate::error::Result;
use crate::frame_queue::{PendingFrameQueue, QueueStats};
use crate::pixel_convert::{ColorSpace, ConvertError, PixelConverter, RgbaFrame, VideoFrame};
use crate::sync::{PlaybackClock, SyncGate};

/// Pull-style audio sink: `(interleaved samples, frames offered) -> frames
/// accepted`. Accepting fewer than offered is backpressure; the rest is
/// offered again on the next `update`.
pub type MixCallback = Box<dyn FnMut(&[f32], usize) -> usize>;

/// Receives the framebuffer every time a new frame is presented.
pub trait TextureSink {
    fn update_texture(&mut self, frame: &RgbaFrame);
}

impl<F: FnMut(&RgbaFrame)> TextureSink for F {
    fn update_texture(&mut self, frame: &RgbaFrame) {
        self(frame)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Closed,
    Opened,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub frames_presented: u64,
    /// Decoded but behind the sync gate
    pub frames_skipped: u64,
    /// Chroma layout the converter does not handle
    pub frames_unsupported: u64,
    /// Decode errors and size mismatches
    pub frames_failed: u64,
    /// Per-channel samples the mix callback accepted
    pub samples_mixed: u64,
    pub queue_capacity: usize,
    /// Slot counters of the current session's frame queue
    pub queue: QueueStats,
}

// ============================================================================
// Session - everything acquired at open, released together
// ============================================================================

struct AudioPipeline {
    decoder: Box<dyn AudioDecoder>,
    /// Staged packet, decoded on the next fill pass
    frame: Packet,
    pcm: Vec<f32>,
    channels: usize,
    /// Per-channel samples in `pcm`
    decoded: usize,
}

impl AudioPipeline {
    fn new(decoder: Box<dyn AudioDecoder>, channels: usize) -> Self {
        let pcm = vec![0.0; decoder.max_buffer_samples() * channels];
        Self {
            decoder,
            frame: Packet::new(),
            pcm,
            channels,
            decoded: 0,
        }
    }

    /// Decode the staged packet into `pcm`. Returns the sample count.
    fn decode_staged(&mut self) -> usize {
        self.decoded = if self.frame.is_valid() {
            self.decoder
                .decode_to_pcm(&self.frame, &mut self.pcm)
                .unwrap_or_else(|| {
                    tracing::debug!("Audio packet at {:.3}s failed to decode", self.frame.time);
                    0
                })
        } else {
            0
        };
        self.decoded
    }

    /// Offer `pcm[offset..decoded]` to the mixer. Returns frames accepted.
    fn mix(&self, callback: &mut MixCallback, offset: usize) -> usize {
        let count = self.decoded.saturating_sub(offset);
        let start = (offset * self.channels).min(self.pcm.len());
        let end = (self.decoded * self.channels).min(self.pcm.len());
        callback(&self.pcm[start..end], count).min(count)
    }
}

struct Session {
    demuxer: Box<dyn Demuxer>,
    video: Box<dyn VideoDecoder>,
    audio: Option<AudioPipeline>,
    frames: PendingFrameQueue<Packet>,
}

impl Session {
    fn open(backend: &dyn MediaBackend, path: &Path, config: &PlaybackConfig) -> Result<Self> {
        let reader = backend.open_reader(path)?;
        let demuxer = backend.open_demuxer(reader, config.audio_track)?;
        let video = backend.open_video_decoder(demuxer.as_ref(), config.resolved_decode_threads())?;

        let channels = demuxer.channels() as usize;
        let audio = if demuxer.audio_codec().is_none() || channels == 0 {
            None
        } else {
            match backend.open_audio_decoder(demuxer.as_ref()) {
                Ok(decoder) => Some(AudioPipeline::new(decoder, channels)),
                Err(e) => {
                    tracing::warn!("Audio disabled for {}: {}", path.display(), e);
                    None
                }
            }
        };

        Ok(Self {
            demuxer,
            video,
            audio,
            frames: PendingFrameQueue::new(),
        })
    }
}

// ============================================================================
// Presenter - conversion and texture hand-off
// ============================================================================

struct Presenter {
    converter: PixelConverter,
    texture: RgbaFrame,
    sink: Option<Box<dyn TextureSink>>,
    layout_warned: bool,
}

impl Presenter {
    fn present(&mut self, image: &VideoFrame) -> std::result::Result<(), ConvertError> {
        if image.color_space != ColorSpace::SRGB && image.color_space != self.converter.color_space() {
            self.converter = PixelConverter::new(image.color_space);
        }
        self.converter.convert(image, &mut self.texture.data)?;
        self.texture.generation += 1;
        if let Some(sink) = self.sink.as_mut() {
            sink.update_texture(&self.texture);
        }
        Ok(())
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct VideoStreamPlayback {
    backend: Arc<dyn MediaBackend>,
    config: PlaybackConfig,
    file: Option<PathBuf>,
    session: Option<Session>,
    presenter: Presenter,
    mix_callback: Option<MixCallback>,

    clock: PlaybackClock,
    gate: SyncGate,
    /// Timestamp of the last frame taken off the queue
    video_pos: f64,
    /// Unconsumed PCM position after a partial mix
    samples_offset: Option<usize>,

    playing: bool,
    paused: bool,
    seek_warned: bool,
    stats: PlaybackStats,
}

impl Default for VideoStreamPlayback {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoStreamPlayback {
    pub fn new() -> Self {
        Self::with_backend(Arc::new(SoftwareBackend::new()))
    }

    pub fn with_backend(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            config: PlaybackConfig::default(),
            file: None,
            session: None,
            presenter: Presenter {
                converter: PixelConverter::new(ColorSpace::default()),
                texture: RgbaFrame::default(),
                sink: None,
                layout_warned: false,
            },
            mix_callback: None,
            clock: PlaybackClock::new(),
            gate: SyncGate::default(),
            video_pos: 0.0,
            samples_offset: None,
            playing: false,
            paused: false,
            seek_warned: false,
            stats: PlaybackStats::default(),
        }
    }

    /// `audio_track` and `decode_threads` apply from the next open.
    pub fn set_config(&mut self, config: PlaybackConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Open / play / stop
    // ------------------------------------------------------------------------

    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> bool {
        match self.try_open(path.as_ref()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to open {}: {}", path.as_ref().display(), e);
                false
            }
        }
    }

    /// Like [`open_file`](Self::open_file) but keeps the error.
    pub fn try_open<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.session = None;
        self.file = None;
        self.playing = false;
        self.reset_cursors();
        self.clock.reset();

        let session = Session::open(self.backend.as_ref(), path, &self.config)?;
        let (width, height) = (session.demuxer.width(), session.demuxer.height());

        tracing::info!(
            "Opened {}: {}x{}, {:.2}s, audio {} ({})",
            path.display(),
            width,
            height,
            session.demuxer.duration(),
            if session.audio.is_some() { "on" } else { "off" },
            session.video.name()
        );

        let generation = self.presenter.texture.generation;
        self.presenter.texture = RgbaFrame::new(width, height);
        self.presenter.texture.generation = generation;
        self.file = Some(path.to_path_buf());
        self.session = Some(session);
        Ok(())
    }

    pub fn play(&mut self) {
        self.stop();
        self.gate = SyncGate::new(self.config.delay_compensation_secs());
        self.playing = true;
    }

    /// Store `config` and play with its delay compensation.
    pub fn play_with(&mut self, config: &PlaybackConfig) {
        self.config = config.clone();
        self.play();
    }

    /// Back to the zero state. When playing, the container is re-opened
    /// from scratch since there is no seek to rewind with.
    pub fn stop(&mut self) {
        if self.playing {
            self.session = None;
            if let Some(path) = self.file.clone() {
                match Session::open(self.backend.as_ref(), &path, &self.config) {
                    Ok(session) => self.session = Some(session),
                    Err(e) => tracing::error!("Re-open of {} failed: {}", path.display(), e),
                }
            }
            self.reset_cursors();
        }
        self.clock.reset();
        self.playing = false;
    }

    fn reset_cursors(&mut self) {
        self.samples_offset = None;
        self.video_pos = 0.0;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn state(&self) -> PlaybackState {
        match (&self.session, self.playing, self.paused) {
            (None, _, _) => PlaybackState::Closed,
            (Some(_), false, _) => PlaybackState::Opened,
            (Some(_), true, true) => PlaybackState::Paused,
            (Some(_), true, false) => PlaybackState::Playing,
        }
    }

    /// Not supported; warns the first time.
    pub fn seek(&mut self, time: f64) {
        if !self.seek_warned && self.config.warn_on_seek {
            tracing::warn!("Seeking is not supported, ignoring seek to {:.3}s", time);
        }
        self.seek_warned = true;
    }

    /// Looping is not supported; the flag is ignored.
    pub fn set_loop(&mut self, _enable: bool) {}

    pub fn has_loop(&self) -> bool {
        false
    }

    /// Takes effect at the next open.
    pub fn set_audio_track(&mut self, index: usize) {
        self.config.audio_track = index;
    }

    // ------------------------------------------------------------------------
    // Host surface
    // ------------------------------------------------------------------------

    pub fn set_mix_callback(&mut self, callback: MixCallback) {
        self.mix_callback = Some(callback);
    }

    pub fn set_texture_sink(&mut self, sink: Box<dyn TextureSink>) {
        self.presenter.sink = Some(sink);
    }

    /// Current framebuffer. `generation` changes on every presented frame.
    pub fn texture(&self) -> &RgbaFrame {
        &self.presenter.texture
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn get_length(&self) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.demuxer.duration())
    }

    pub fn get_playback_position(&self) -> f64 {
        self.video_pos
    }

    pub fn get_channels(&self) -> u32 {
        match &self.session {
            Some(s) if s.audio.is_some() => s.demuxer.channels(),
            _ => 0,
        }
    }

    pub fn get_mix_rate(&self) -> u32 {
        match &self.session {
            Some(s) if s.audio.is_some() => s.demuxer.sample_rate(),
            _ => 0,
        }
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            queue_capacity: self.session.as_ref().map_or(0, |s| s.frames.capacity()),
            queue: self.session.as_ref().map_or(QueueStats::default(), |s| s.frames.stats()),
            ..self.stats
        }
    }

    // ------------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------------

    pub fn update(&mut self, delta: f64) {
        if !self.playing || self.paused {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let time = self.clock.advance(delta);
        if time < self.video_pos {
            return;
        }

        let mut audio_full = false;

        // Leftover from a partial mix last tick
        if let Some(offset) = self.samples_offset {
            match (session.audio.as_ref(), self.mix_callback.as_mut()) {
                (Some(audio), Some(mix)) => {
                    let remaining = audio.decoded.saturating_sub(offset);
                    let mixed = audio.mix(mix, offset);
                    self.stats.samples_mixed += mixed as u64;
                    if mixed != remaining {
                        self.samples_offset = Some(offset + mixed);
                        audio_full = true;
                    } else {
                        self.samples_offset = None;
                    }
                }
                _ => self.samples_offset = None,
            }
        }

        let has_audio = session.audio.is_some() && self.mix_callback.is_some();

        loop {
            let wanted = if has_audio {
                !audio_full
                    && !self
                        .gate
                        .has_enough_lookahead(session.frames.back().map(|p| p.time), time)
            } else {
                session.frames.is_empty()
            };
            if !wanted {
                break;
            }

            if has_audio && !audio_full {
                if let (Some(audio), Some(mix)) = (session.audio.as_mut(), self.mix_callback.as_mut()) {
                    if audio.frame.is_valid() && audio.decode_staged() > 0 {
                        let mixed = audio.mix(mix, 0);
                        self.stats.samples_mixed += mixed as u64;
                        if mixed != audio.decoded {
                            self.samples_offset = Some(mixed);
                            audio_full = true;
                        }
                    }
                }
            }

            let slot = session.frames.write_slot();
            let audio_slot = session.audio.as_mut().map(|a| &mut a.frame);
            if !session.demuxer.read_frame(slot, audio_slot) {
                break;
            }
            if slot.is_valid() {
                session.frames.commit();
            }
        }

        let (width, height) = (session.demuxer.width() as usize, session.demuxer.height() as usize);
        let mut presented = false;
        while !presented {
            let Some(packet) = session.frames.front() else {
                break;
            };
            let frame_time = packet.time;

            // Every packet goes through the decoder, shown or not
            if session.video.decode(packet) {
                if self.gate.is_due(frame_time, time) {
                    match session.video.get_image() {
                        Ok(image) if image.width == width && image.height == height => {
                            match self.presenter.present(image) {
                                Ok(()) => {
                                    presented = true;
                                    self.stats.frames_presented += 1;
                                }
                                Err(ConvertError::UnsupportedLayout { shift_w, shift_h }) => {
                                    if !self.presenter.layout_warned {
                                        tracing::warn!(
                                            "Chroma shift ({}, {}) is not supported, frames will be dropped",
                                            shift_w,
                                            shift_h
                                        );
                                        self.presenter.layout_warned = true;
                                    }
                                    self.stats.frames_unsupported += 1;
                                }
                                Err(e) => {
                                    tracing::debug!("Frame at {:.3}s not converted: {}", frame_time, e);
                                    self.stats.frames_failed += 1;
                                }
                            }
                        }
                        Ok(image) => {
                            tracing::debug!(
                                "Frame at {:.3}s is {}x{}, stream is {}x{}",
                                frame_time,
                                image.width,
                                image.height,
                                width,
                                height
                            );
                            self.stats.frames_failed += 1;
                        }
                        Err(ImageError::NoFrame) => {}
                        Err(ImageError::Failed(msg)) => {
                            tracing::debug!("No image for frame at {:.3}s: {}", frame_time, msg);
                            self.stats.frames_failed += 1;
                        }
                    }
                } else {
                    tracing::trace!("Skipping late frame at {:.3}s (clock {:.3}s)", frame_time, time);
                    self.stats.frames_skipped += 1;
                }
            } else {
                tracing::debug!("Decode failed for frame at {:.3}s", frame_time);
                self.stats.frames_failed += 1;
            }

            self.video_pos = frame_time;
            session.frames.pop_front_and_recycle();
        }

        if session.frames.is_empty() && session.demuxer.is_end_of_stream() {
            tracing::debug!("End of stream at {:.3}s, stopping", self.video_pos);
            self.stop();
        }
    }
}
