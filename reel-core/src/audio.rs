// AUDIO - Matroska audio packets to interleaved f32 PCM
// symphonia (decode); mixing is the host's job
//
// Matroska stores codec setup in CodecPrivate in its own framing, so the
// headers are rewritten into what symphonia's decoders expect before the
// decoder is built.

use symphonia::core::audio::{Channels, SampleBuffer, SignalSpec};
use symphonia::core::codecs::{
    CodecParameters, CodecType, DecoderOptions, CODEC_TYPE_FLAC, CODEC_TYPE_PCM_F32LE,
    CODEC_TYPE_PCM_F64LE, CODEC_TYPE_PCM_S16BE, CODEC_TYPE_PCM_S16LE, CODEC_TYPE_PCM_S24BE,
    CODEC_TYPE_PCM_S24LE, CODEC_TYPE_PCM_S32BE, CODEC_TYPE_PCM_S32LE, CODEC_TYPE_PCM_U8,
    CODEC_TYPE_VORBIS,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet as SymphoniaPacket;

use crate::decode::AudioDecoder;
use crate::demuxer::{CodecInfo, Packet};
use crate::error::{PlaybackError, Result};

/// Upper bound on frames in one PCM block
const PCM_MAX_FRAMES: u64 = 1 << 16;
/// Largest Vorbis block is 8192 samples, half of which is output
const VORBIS_MAX_FRAMES: u64 = 8192;
const FLAC_MAX_FRAMES: u64 = 65535;

// ============================================================================
// Codec mapping
// ============================================================================

/// Symphonia codec and per-packet frame bound for a Matroska audio codec id.
pub fn codec_type_for(codec: &CodecInfo) -> Option<(CodecType, u64)> {
    let bits = codec.bit_depth;
    let mapped = match codec.codec_id.as_str() {
        "A_VORBIS" => (CODEC_TYPE_VORBIS, VORBIS_MAX_FRAMES),
        "A_FLAC" => (CODEC_TYPE_FLAC, FLAC_MAX_FRAMES),
        "A_PCM/INT/LIT" => match bits {
            Some(8) => (CODEC_TYPE_PCM_U8, PCM_MAX_FRAMES),
            Some(24) => (CODEC_TYPE_PCM_S24LE, PCM_MAX_FRAMES),
            Some(32) => (CODEC_TYPE_PCM_S32LE, PCM_MAX_FRAMES),
            _ => (CODEC_TYPE_PCM_S16LE, PCM_MAX_FRAMES),
        },
        "A_PCM/INT/BIG" => match bits {
            Some(24) => (CODEC_TYPE_PCM_S24BE, PCM_MAX_FRAMES),
            Some(32) => (CODEC_TYPE_PCM_S32BE, PCM_MAX_FRAMES),
            _ => (CODEC_TYPE_PCM_S16BE, PCM_MAX_FRAMES),
        },
        "A_PCM/FLOAT/IEEE" => match bits {
            Some(64) => (CODEC_TYPE_PCM_F64LE, PCM_MAX_FRAMES),
            _ => (CODEC_TYPE_PCM_F32LE, PCM_MAX_FRAMES),
        },
        _ => return None,
    };
    Some(mapped)
}

fn pcm_width(codec_type: CodecType) -> Option<u32> {
    match codec_type {
        CODEC_TYPE_PCM_U8 => Some(8),
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => Some(16),
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => Some(24),
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE | CODEC_TYPE_PCM_F32LE => Some(32),
        CODEC_TYPE_PCM_F64LE => Some(64),
        _ => None,
    }
}

/// First `count` speaker positions.
fn channel_mask(count: u32) -> Option<Channels> {
    if count == 0 || count > 32 {
        return None;
    }
    let bits = if count == 32 { u32::MAX } else { (1u32 << count) - 1 };
    Some(Channels::from_bits_truncate(bits))
}

// ============================================================================
// CodecPrivate rewriting
// ============================================================================

/// Split Xiph-laced Vorbis headers and return identification + setup, the
/// comment header dropped.
pub fn vorbis_extra_data(private: &[u8]) -> Option<Vec<u8>> {
    let (&count, mut rest) = private.split_first()?;
    if count != 2 {
        return None;
    }

    let mut sizes = [0usize; 2];
    for size in sizes.iter_mut() {
        loop {
            let (&b, tail) = rest.split_first()?;
            rest = tail;
            *size += b as usize;
            if b != 255 {
                break;
            }
        }
    }

    let ident = rest.get(..sizes[0])?;
    let setup = rest.get(sizes[0] + sizes[1]..)?;
    if setup.is_empty() {
        return None;
    }

    let mut out = Vec::with_capacity(ident.len() + setup.len());
    out.extend_from_slice(ident);
    out.extend_from_slice(setup);
    Some(out)
}

/// `fLaC` + metadata blocks down to the STREAMINFO body.
pub fn flac_extra_data(private: &[u8]) -> Option<Vec<u8>> {
    let blocks = private.strip_prefix(b"fLaC")?;
    let header = blocks.get(..4)?;
    if header[0] & 0x7F != 0 {
        return None;
    }
    let len = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
    blocks.get(4..4 + len).map(|b| b.to_vec())
}

// ============================================================================
// Decoder
// ============================================================================

pub struct SymphoniaAudioDecoder {
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    max_frames: usize,
    sample_buf: Option<SampleBuffer<f32>>,
    buf_frames: u64,
    buf_spec: Option<SignalSpec>,
    packet_index: u64,
}

impl SymphoniaAudioDecoder {
    pub fn new(codec: &CodecInfo, channels: u32, sample_rate: u32) -> Result<Self> {
        let (codec_type, max_frames) = codec_type_for(codec)
            .ok_or_else(|| PlaybackError::UnsupportedCodec(codec.codec_id.clone()))?;
        let layout = channel_mask(channels)
            .ok_or_else(|| PlaybackError::DecoderInit(format!("{} channels", channels)))?;

        let mut params = CodecParameters::new();
        params
            .for_codec(codec_type)
            .with_sample_rate(sample_rate)
            .with_channels(layout)
            .with_max_frames_per_packet(max_frames);

        if let Some(width) = pcm_width(codec_type) {
            params.with_bits_per_sample(width).with_bits_per_coded_sample(width);
        }

        let private = codec.codec_private.as_deref();
        let extra = if codec_type == CODEC_TYPE_VORBIS {
            Some(private.and_then(vorbis_extra_data).ok_or_else(|| {
                PlaybackError::DecoderInit("Vorbis headers missing".to_string())
            })?)
        } else if codec_type == CODEC_TYPE_FLAC {
            Some(private.and_then(flac_extra_data).ok_or_else(|| {
                PlaybackError::DecoderInit("FLAC STREAMINFO missing".to_string())
            })?)
        } else {
            None
        };
        if let Some(extra) = extra {
            params.with_extra_data(extra.into_boxed_slice());
        }

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| PlaybackError::DecoderInit(format!("Symphonia: {}", e)))?;

        tracing::debug!(
            "Audio decoder: {} ({} ch @ {} Hz)",
            codec.codec_id,
            channels,
            sample_rate
        );

        Ok(Self {
            decoder,
            max_frames: max_frames as usize,
            sample_buf: None,
            buf_frames: 0,
            buf_spec: None,
            packet_index: 0,
        })
    }
}

impl AudioDecoder for SymphoniaAudioDecoder {
    fn max_buffer_samples(&self) -> usize {
        self.max_frames
    }

    fn decode_to_pcm(&mut self, packet: &Packet, out: &mut [f32]) -> Option<usize> {
        let sym_packet = SymphoniaPacket::new_from_slice(0, self.packet_index, 0, &packet.data);
        self.packet_index += 1;

        let decoded = match self.decoder.decode(&sym_packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!("Audio decode error at {:.3}s: {}", packet.time, e);
                return None;
            }
            Err(e) => {
                tracing::debug!("Audio decoder failed at {:.3}s: {}", packet.time, e);
                return None;
            }
        };

        if decoded.frames() == 0 {
            return Some(0);
        }

        let spec = *decoded.spec();
        let capacity = decoded.capacity() as u64;
        if self.buf_spec != Some(spec) || self.buf_frames < capacity {
            self.sample_buf = Some(SampleBuffer::new(capacity, spec));
            self.buf_frames = capacity;
            self.buf_spec = Some(spec);
        }

        let buf = self.sample_buf.as_mut()?;
        buf.copy_interleaved_ref(decoded);

        let samples = buf.samples();
        let channels = spec.channels.count().max(1);
        let frames = (samples.len() / channels).min(out.len() / channels);
        let n = frames * channels;
        out[..n].copy_from_slice(&samples[..n]);
        Some(frames)
    }
}
