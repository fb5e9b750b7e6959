//! Scripted media backend for engine tests.
//!
//! Synthesizes a stream from a [`ScriptedStream`] description: video
//! packets at `fps`, each followed by one audio packet when audio is on.
//! Audio samples count up from zero across the stream so a test can tell
//! whether anything was dropped or delivered twice.
//!
//! [`MatroskaClip`] writes small real Matroska files for the demuxer and
//! the software backend.

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::backend::MediaBackend;
use crate::decode::{AudioDecoder, ImageError, VideoDecoder};
use crate::demuxer::{CodecInfo, Demuxer, Packet, StreamInfo};
use crate::error::{PlaybackError, Result};
use crate::pixel_convert::{ColorSpace, VideoFrame};
use crate::reader::{ContainerReader, MemoryReader};

#[derive(Debug, Clone)]
pub struct ScriptedAudio {
    pub channels: u32,
    pub sample_rate: u32,
    pub frames_per_packet: usize,
}

#[derive(Debug, Clone)]
pub struct ScriptedStream {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
    pub chroma_shift: (u8, u8),
    pub color_space: ColorSpace,
    pub audio: Option<ScriptedAudio>,
    pub audio_decoder_fails: bool,
    pub corrupt: bool,
}

impl ScriptedStream {
    pub fn new(width: u32, height: u32, fps: f64, duration: f64) -> Self {
        Self {
            width,
            height,
            fps,
            duration,
            chroma_shift: (1, 1),
            color_space: ColorSpace::BT601,
            audio: None,
            audio_decoder_fails: false,
            corrupt: false,
        }
    }

    pub fn corrupt() -> Self {
        Self {
            corrupt: true,
            ..Self::new(16, 16, 30.0, 1.0)
        }
    }

    pub fn with_audio(mut self, channels: u32, sample_rate: u32) -> Self {
        let frames_per_packet = (sample_rate as f64 / self.fps).round() as usize;
        self.audio = Some(ScriptedAudio {
            channels,
            sample_rate,
            frames_per_packet,
        });
        self
    }

    pub fn with_chroma_shift(mut self, shift_w: u8, shift_h: u8) -> Self {
        self.chroma_shift = (shift_w, shift_h);
        self
    }

    pub fn with_failing_audio_decoder(mut self) -> Self {
        self.audio_decoder_fails = true;
        self
    }

    pub fn frame_count(&self) -> usize {
        (self.duration * self.fps).round() as usize
    }
}

/// What the engine did to the backend.
#[derive(Debug, Default)]
pub struct ScriptLog {
    pub demuxer_opens: usize,
    /// Timestamp of every packet handed to the video decoder
    pub decoded_times: Vec<f64>,
}

pub struct ScriptedBackend {
    stream: ScriptedStream,
    log: Arc<Mutex<ScriptLog>>,
}

impl ScriptedBackend {
    pub fn new(stream: ScriptedStream) -> Self {
        Self {
            stream,
            log: Arc::new(Mutex::new(ScriptLog::default())),
        }
    }

    pub fn log(&self) -> Arc<Mutex<ScriptLog>> {
        Arc::clone(&self.log)
    }
}

impl MediaBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open_reader(&self, _path: &Path) -> Result<Box<dyn ContainerReader>> {
        Ok(Box::new(MemoryReader::new(Vec::new())))
    }

    fn open_demuxer(
        &self,
        _reader: Box<dyn ContainerReader>,
        _audio_track: usize,
    ) -> Result<Box<dyn Demuxer>> {
        if self.stream.corrupt {
            return Err(PlaybackError::Demux("scripted corrupt container".to_string()));
        }
        if let Ok(mut log) = self.log.lock() {
            log.demuxer_opens += 1;
        }
        Ok(Box::new(ScriptedDemuxer::new(self.stream.clone())))
    }

    fn open_video_decoder(
        &self,
        demuxer: &dyn Demuxer,
        _threads: usize,
    ) -> Result<Box<dyn VideoDecoder>> {
        let mut frame = VideoFrame::new(
            demuxer.width() as usize,
            demuxer.height() as usize,
            self.stream.chroma_shift.0,
            self.stream.chroma_shift.1,
        );
        frame.color_space = self.stream.color_space;
        Ok(Box::new(ScriptedVideoDecoder {
            frame,
            has_frame: false,
            log: Arc::clone(&self.log),
        }))
    }

    fn open_audio_decoder(&self, demuxer: &dyn Demuxer) -> Result<Box<dyn AudioDecoder>> {
        let audio = match (&self.stream.audio, demuxer.audio_codec()) {
            (Some(audio), Some(_)) if !self.stream.audio_decoder_fails => audio.clone(),
            _ => return Err(PlaybackError::UnsupportedCodec("A_OPUS".to_string())),
        };
        Ok(Box::new(ScriptedAudioDecoder { audio }))
    }
}

// ============================================================================
// Demuxer
// ============================================================================

struct ScriptedDemuxer {
    info: StreamInfo,
    video_codec: CodecInfo,
    audio_codec: Option<CodecInfo>,
    fps: f64,
    frame_count: usize,
    next_video: usize,
    audio_pending: bool,
    eos: bool,
}

impl ScriptedDemuxer {
    fn new(stream: ScriptedStream) -> Self {
        let info = StreamInfo {
            width: stream.width,
            height: stream.height,
            channels: stream.audio.as_ref().map_or(0, |a| a.channels),
            sample_rate: stream.audio.as_ref().map_or(0, |a| a.sample_rate),
            duration: stream.duration,
        };
        Self {
            info,
            video_codec: CodecInfo {
                codec_id: "V_SCRIPTED".to_string(),
                ..Default::default()
            },
            audio_codec: stream.audio.as_ref().map(|_| CodecInfo {
                codec_id: "A_SCRIPTED".to_string(),
                ..Default::default()
            }),
            fps: stream.fps,
            frame_count: stream.frame_count(),
            next_video: 0,
            audio_pending: false,
            eos: false,
        }
    }
}

impl Demuxer for ScriptedDemuxer {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn video_codec(&self) -> &CodecInfo {
        &self.video_codec
    }

    fn audio_codec(&self) -> Option<&CodecInfo> {
        self.audio_codec.as_ref()
    }

    fn read_frame(&mut self, video: &mut Packet, mut audio: Option<&mut Packet>) -> bool {
        video.invalidate();
        if let Some(a) = audio.as_deref_mut() {
            a.invalidate();
        }
        if self.eos {
            return false;
        }

        // Audio packet i rides right behind video packet i
        if self.audio_pending {
            self.audio_pending = false;
            let index = self.next_video - 1;
            if let Some(a) = audio.as_deref_mut() {
                a.fill(&(index as u32).to_le_bytes(), index as f64 / self.fps, true);
                return true;
            }
        }

        if self.next_video >= self.frame_count {
            self.eos = true;
            return false;
        }

        let index = self.next_video;
        video.fill(&(index as u32).to_le_bytes(), index as f64 / self.fps, index == 0);
        self.next_video += 1;
        self.audio_pending = self.audio_codec.is_some();
        true
    }

    fn is_end_of_stream(&self) -> bool {
        self.eos
    }
}

fn packet_index(packet: &Packet) -> usize {
    let mut bytes = [0u8; 4];
    let n = packet.data.len().min(4);
    bytes[..n].copy_from_slice(&packet.data[..n]);
    u32::from_le_bytes(bytes) as usize
}

// ============================================================================
// Decoders
// ============================================================================

struct ScriptedVideoDecoder {
    frame: VideoFrame,
    has_frame: bool,
    log: Arc<Mutex<ScriptLog>>,
}

impl VideoDecoder for ScriptedVideoDecoder {
    fn decode(&mut self, packet: &Packet) -> bool {
        let luma = 16 + (packet_index(packet) % 200) as u8;
        self.frame.planes[0].fill(luma);
        self.frame.planes[1].fill(128);
        self.frame.planes[2].fill(128);
        self.frame.pts = packet.time;
        self.has_frame = true;
        if let Ok(mut log) = self.log.lock() {
            log.decoded_times.push(packet.time);
        }
        true
    }

    fn get_image(&mut self) -> std::result::Result<&VideoFrame, ImageError> {
        if self.has_frame {
            Ok(&self.frame)
        } else {
            Err(ImageError::NoFrame)
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedAudioDecoder {
    audio: ScriptedAudio,
}

impl AudioDecoder for ScriptedAudioDecoder {
    fn max_buffer_samples(&self) -> usize {
        self.audio.frames_per_packet
    }

    fn decode_to_pcm(&mut self, packet: &Packet, out: &mut [f32]) -> Option<usize> {
        let channels = self.audio.channels as usize;
        let frames = self.audio.frames_per_packet;
        let first = packet_index(packet) * frames;
        for (i, frame) in out.chunks_exact_mut(channels).take(frames).enumerate() {
            frame.fill((first + i) as f32);
        }
        Some(frames)
    }
}

// ============================================================================
// Matroska fixtures
// ============================================================================

/// Audio track in a [`MatroskaClip`]: 16-bit little-endian PCM.
#[derive(Debug, Clone, Copy)]
pub struct ClipAudio {
    pub channels: u32,
    pub sample_rate: u32,
    /// Every sample in the track
    pub sample: i16,
}

/// Minimal Matroska file: one 4x2 `V_UNCOMPRESSED` I420 track, any number
/// of PCM tracks, and a single cluster of SimpleBlocks at a 1 ms timestamp
/// scale. Each video block is followed by one block per audio track.
#[derive(Debug, Clone)]
pub struct MatroskaClip {
    pub fps: f64,
    pub seconds: f64,
    pub audio: Vec<ClipAudio>,
}

const CLIP_WIDTH: u64 = 4;
const CLIP_HEIGHT: u64 = 2;
const CLIP_TIMESTAMP_SCALE: u64 = 1_000_000;

impl MatroskaClip {
    pub fn new(fps: f64, seconds: f64) -> Self {
        Self {
            fps,
            seconds,
            audio: Vec::new(),
        }
    }

    pub fn with_audio(mut self, channels: u32, sample_rate: u32, sample: i16) -> Self {
        self.audio.push(ClipAudio {
            channels,
            sample_rate,
            sample,
        });
        self
    }

    pub fn frame_count(&self) -> usize {
        (self.seconds * self.fps).round() as usize
    }

    /// Video block timestamp in timestamp-scale ticks (ms).
    pub fn frame_ticks(&self, index: usize) -> u64 {
        (index as f64 * 1000.0 / self.fps).round() as u64
    }

    /// PCM frames carried by one audio block.
    pub fn audio_frames_per_block(&self, track: usize) -> usize {
        (self.audio[track].sample_rate as f64 / self.fps).round() as usize
    }

    pub fn build(&self) -> Vec<u8> {
        let header = [
            ebml_uint(0x4286, 1),
            ebml_uint(0x42F7, 1),
            ebml_uint(0x42F2, 4),
            ebml_uint(0x42F3, 8),
            ebml_str(0x4282, "matroska"),
            ebml_uint(0x4287, 4),
            ebml_uint(0x4285, 2),
        ]
        .concat();

        let info = ebml(
            0x1549A966,
            &[
                ebml_uint(0x2AD7B1, CLIP_TIMESTAMP_SCALE),
                ebml_float(0x4489, self.seconds * 1000.0),
                ebml_str(0x4D80, "reel-tests"),
                ebml_str(0x5741, "reel-tests"),
            ]
            .concat(),
        );

        let mut tracks = vec![ebml(
            0xAE,
            &[
                ebml_uint(0xD7, 1),
                ebml_uint(0x73C5, 1),
                ebml_uint(0x83, 1),
                ebml_str(0x86, "V_UNCOMPRESSED"),
                ebml(0x63A2, b"I420"),
                ebml(
                    0xE0,
                    &[ebml_uint(0xB0, CLIP_WIDTH), ebml_uint(0xBA, CLIP_HEIGHT)].concat(),
                ),
            ]
            .concat(),
        )];
        for (i, audio) in self.audio.iter().enumerate() {
            let number = 2 + i as u64;
            tracks.push(ebml(
                0xAE,
                &[
                    ebml_uint(0xD7, number),
                    ebml_uint(0x73C5, number),
                    ebml_uint(0x83, 2),
                    ebml_str(0x86, "A_PCM/INT/LIT"),
                    ebml(
                        0xE1,
                        &[
                            ebml_float(0xB5, audio.sample_rate as f64),
                            ebml_uint(0x9F, audio.channels as u64),
                            ebml_uint(0x6264, 16),
                        ]
                        .concat(),
                    ),
                ]
                .concat(),
            ));
        }
        let tracks = ebml(0x1654AE6B, &tracks.concat());

        let mut cluster = ebml_uint(0xE7, 0);
        for index in 0..self.frame_count() {
            let ticks = self.frame_ticks(index) as i16;
            let luma = (16 + index % 200) as u8;
            let mut picture = vec![luma; (CLIP_WIDTH * CLIP_HEIGHT) as usize];
            picture.extend_from_slice(&[128; 4]);
            cluster.extend(simple_block(1, ticks, &picture));

            for (track, audio) in self.audio.iter().enumerate() {
                let samples = self.audio_frames_per_block(track) * audio.channels as usize;
                let pcm: Vec<u8> = std::iter::repeat(audio.sample.to_le_bytes())
                    .take(samples)
                    .flatten()
                    .collect();
                cluster.extend(simple_block(2 + track as u8, ticks, &pcm));
            }
        }
        let cluster = ebml(0x1F43B675, &cluster);

        let segment = ebml(0x18538067, &[info, tracks, cluster].concat());
        [ebml(0x1A45DFA3, &header), segment].concat()
    }
}

/// Element with an 8-byte size field.
fn ebml(id: u32, payload: &[u8]) -> Vec<u8> {
    let id_bytes = id.to_be_bytes();
    let skip = id_bytes.iter().position(|&b| b != 0).unwrap_or(3);
    let mut out = id_bytes[skip..].to_vec();
    out.push(0x01);
    out.extend_from_slice(&(payload.len() as u64).to_be_bytes()[1..]);
    out.extend_from_slice(payload);
    out
}

fn ebml_uint(id: u32, value: u64) -> Vec<u8> {
    ebml(id, &value.to_be_bytes())
}

fn ebml_float(id: u32, value: f64) -> Vec<u8> {
    ebml(id, &value.to_be_bytes())
}

fn ebml_str(id: u32, value: &str) -> Vec<u8> {
    ebml(id, value.as_bytes())
}

/// Keyframe, no lacing. `track` must be below 127.
fn simple_block(track: u8, ticks: i16, data: &[u8]) -> Vec<u8> {
    let mut payload = vec![0x80 | track];
    payload.extend_from_slice(&ticks.to_be_bytes());
    payload.push(0x80);
    payload.extend_from_slice(data);
    ebml(0xA3, &payload)
}
