//! # Video Decode Module
//!
//! Decoder contracts and the software video backends.
//!
//! ## Decoder selection by Matroska codec id:
//! 1. `V_UNCOMPRESSED` - raw planar frames, always available
//! 2. `V_MPEG4/ISO/AVC` - OpenH264 (feature `software-decode`)
//!
//! Anything else is an open failure.

use thiserror::Error;

use crate::demuxer::{CodecInfo, Packet};
use crate::error::{PlaybackError, Result};
use crate::pixel_convert::{ColorSpace, VideoFrame};

/// Why `get_image` produced no picture.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImageError {
    /// The decoder accepted the packet but has nothing to show yet
    #[error("No frame available")]
    NoFrame,
    #[error("Decode failed: {0}")]
    Failed(String),
}

/// Compressed video in, planar pictures out.
///
/// `decode` must see every packet in order, including packets whose picture
/// will be skipped, since inter-coded streams depend on earlier frames.
pub trait VideoDecoder {
    fn decode(&mut self, packet: &Packet) -> bool;

    /// Picture produced by the most recent `decode`.
    fn get_image(&mut self) -> std::result::Result<&VideoFrame, ImageError>;

    fn name(&self) -> &str;
}

/// Compressed audio in, interleaved f32 PCM out.
pub trait AudioDecoder {
    /// Largest per-channel sample count one packet can produce.
    fn max_buffer_samples(&self) -> usize;

    /// Decode into `out` (interleaved). Returns per-channel samples written,
    /// `None` on decode failure.
    fn decode_to_pcm(&mut self, packet: &Packet, out: &mut [f32]) -> Option<usize>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FrameStatus {
    Empty,
    Ready,
    NoFrame,
    Failed(String),
}

impl FrameStatus {
    fn image<'a>(&self, frame: &'a VideoFrame) -> std::result::Result<&'a VideoFrame, ImageError> {
        match self {
            Self::Ready => Ok(frame),
            Self::Empty | Self::NoFrame => Err(ImageError::NoFrame),
            Self::Failed(msg) => Err(ImageError::Failed(msg.clone())),
        }
    }
}

/// Pick a video decoder for the track.
pub fn create_video_decoder(
    codec: &CodecInfo,
    width: u32,
    height: u32,
    threads: usize,
) -> Result<Box<dyn VideoDecoder>> {
    match codec.codec_id.as_str() {
        "V_UNCOMPRESSED" => Ok(Box::new(RawVideoDecoder::new(codec, width, height)?)),
        #[cfg(feature = "software-decode")]
        "V_MPEG4/ISO/AVC" => Ok(Box::new(OpenH264Decoder::new(codec, threads)?)),
        other => {
            let _ = threads;
            Err(PlaybackError::UnsupportedCodec(other.to_string()))
        }
    }
}

// ============================================================================
// Raw planar video
// ============================================================================

/// Planar layout of an uncompressed track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLayout {
    pub chroma_shift_w: u8,
    pub chroma_shift_h: u8,
    /// Stored order is Y, V, U
    pub swap_chroma: bool,
    pub color_space: ColorSpace,
}

impl RawLayout {
    pub fn from_fourcc(fourcc: &[u8]) -> Option<Self> {
        let yuv = |w, h| RawLayout {
            chroma_shift_w: w,
            chroma_shift_h: h,
            swap_chroma: false,
            color_space: ColorSpace::BT601,
        };
        match fourcc {
            b"I420" | b"IYUV" => Some(yuv(1, 1)),
            b"YV12" => Some(Self {
                swap_chroma: true,
                ..yuv(1, 1)
            }),
            b"Y42B" | b"I422" => Some(yuv(1, 0)),
            b"Y41B" => Some(yuv(2, 0)),
            b"I444" | b"Y444" => Some(yuv(0, 0)),
            b"G3\0\x08" | b"GBRP" => Some(Self {
                color_space: ColorSpace::SRGB,
                ..yuv(0, 0)
            }),
            _ => None,
        }
    }
}

/// `V_UNCOMPRESSED` frames: one packet is one tightly packed planar image.
/// The fourcc comes from CodecPrivate; I420 when absent.
pub struct RawVideoDecoder {
    layout: RawLayout,
    frame: VideoFrame,
    status: FrameStatus,
}

impl RawVideoDecoder {
    pub fn new(codec: &CodecInfo, width: u32, height: u32) -> Result<Self> {
        let layout = match codec.codec_private.as_deref() {
            Some(private) if private.len() >= 4 => RawLayout::from_fourcc(&private[..4])
                .ok_or_else(|| {
                    PlaybackError::UnsupportedCodec(format!(
                        "V_UNCOMPRESSED/{}",
                        String::from_utf8_lossy(&private[..4])
                    ))
                })?,
            _ => RawLayout::from_fourcc(b"I420").ok_or_else(|| {
                PlaybackError::DecoderInit("I420 layout missing".to_string())
            })?,
        };
        Ok(Self::with_layout(layout, width, height))
    }

    pub fn with_layout(layout: RawLayout, width: u32, height: u32) -> Self {
        let mut frame = VideoFrame::new(
            width as usize,
            height as usize,
            layout.chroma_shift_w,
            layout.chroma_shift_h,
        );
        frame.color_space = layout.color_space;
        Self {
            layout,
            frame,
            status: FrameStatus::Empty,
        }
    }

    fn frame_size(&self) -> (usize, usize) {
        let luma = self.frame.width * self.frame.height;
        let (cw, ch) = self.frame.chroma_size();
        (luma, cw * ch)
    }
}

impl VideoDecoder for RawVideoDecoder {
    fn decode(&mut self, packet: &Packet) -> bool {
        let (luma, chroma) = self.frame_size();
        if packet.data.len() != luma + 2 * chroma {
            self.status = FrameStatus::Failed(format!(
                "raw frame is {} bytes, expected {}",
                packet.data.len(),
                luma + 2 * chroma
            ));
            return false;
        }

        let (y, rest) = packet.data.split_at(luma);
        let (first, second) = rest.split_at(chroma);
        let (u, v) = if self.layout.swap_chroma {
            (second, first)
        } else {
            (first, second)
        };
        self.frame.planes[0].copy_from_slice(y);
        self.frame.planes[1].copy_from_slice(u);
        self.frame.planes[2].copy_from_slice(v);
        self.frame.pts = packet.time;
        self.status = FrameStatus::Ready;
        true
    }

    fn get_image(&mut self) -> std::result::Result<&VideoFrame, ImageError> {
        self.status.image(&self.frame)
    }

    fn name(&self) -> &str {
        "raw"
    }
}

// ============================================================================
// OpenH264 Software Decoder
// ============================================================================

#[cfg(feature = "software-decode")]
pub struct OpenH264Decoder {
    decoder: openh264::decoder::Decoder,
    avc: Option<crate::h264_utils::AvcConfig>,
    send_parameter_sets: bool,
    annexb: Vec<u8>,
    frame: VideoFrame,
    status: FrameStatus,
}

#[cfg(feature = "software-decode")]
impl OpenH264Decoder {
    pub fn new(codec: &CodecInfo, threads: usize) -> Result<Self> {
        let decoder = openh264::decoder::Decoder::new()
            .map_err(|e| PlaybackError::DecoderInit(format!("OpenH264: {}", e)))?;

        let avc = codec
            .codec_private
            .as_deref()
            .and_then(crate::h264_utils::AvcConfig::parse);
        if avc.is_none() {
            tracing::debug!("No avcC record, treating packets as Annex B");
        }
        // OpenH264 decodes on the calling thread; the count is informational
        tracing::debug!("OpenH264 decoder opened ({} threads offered)", threads);

        Ok(Self {
            decoder,
            avc,
            send_parameter_sets: true,
            annexb: Vec::new(),
            frame: VideoFrame::new(0, 0, 1, 1),
            status: FrameStatus::Empty,
        })
    }
}

#[cfg(feature = "software-decode")]
fn copy_yuv(yuv: &impl openh264::formats::YUVSource, frame: &mut VideoFrame) {
    let (width, height) = yuv.dimensions();
    let (ys, us, vs) = yuv.strides();
    frame.width = width;
    frame.height = height;
    frame.chroma_shift_w = 1;
    frame.chroma_shift_h = 1;
    frame.color_space = ColorSpace::BT601;
    frame.linesize = [ys, us, vs];
    for (plane, src) in frame.planes.iter_mut().zip([yuv.y(), yuv.u(), yuv.v()]) {
        plane.clear();
        plane.extend_from_slice(src);
    }
}

#[cfg(feature = "software-decode")]
impl VideoDecoder for OpenH264Decoder {
    fn decode(&mut self, packet: &Packet) -> bool {
        self.annexb.clear();
        match &self.avc {
            Some(avc) => {
                if self.send_parameter_sets {
                    self.annexb.extend_from_slice(&avc.parameter_sets);
                }
                if !crate::h264_utils::avcc_to_annexb(&packet.data, avc.nal_length_size, &mut self.annexb) {
                    self.status = FrameStatus::Failed("malformed AVCC packet".to_string());
                    return false;
                }
            }
            None => self.annexb.extend_from_slice(&packet.data),
        }

        match self.decoder.decode(&self.annexb) {
            Ok(Some(yuv)) => {
                copy_yuv(&yuv, &mut self.frame);
                self.frame.pts = packet.time;
                self.status = FrameStatus::Ready;
                self.send_parameter_sets = false;
                true
            }
            Ok(None) => {
                self.status = FrameStatus::NoFrame;
                self.send_parameter_sets = false;
                true
            }
            Err(e) => {
                tracing::debug!("OpenH264 decode error at {:.3}s: {}", packet.time, e);
                self.status = FrameStatus::Failed(e.to_string());
                false
            }
        }
    }

    fn get_image(&mut self) -> std::result::Result<&VideoFrame, ImageError> {
        self.status.image(&self.frame)
    }

    fn name(&self) -> &str {
        "OpenH264"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_codec(fourcc: Option<&[u8]>) -> CodecInfo {
        CodecInfo {
            codec_id: "V_UNCOMPRESSED".to_string(),
            codec_private: fourcc.map(|f| f.to_vec()),
            bit_depth: None,
        }
    }

    #[test]
    fn test_raw_i420_default() {
        let mut dec = RawVideoDecoder::new(&raw_codec(None), 4, 2).unwrap();
        assert_eq!(dec.get_image().unwrap_err(), ImageError::NoFrame);

        // 8 luma + 2 U + 2 V
        let mut packet = Packet::new();
        packet.fill(&[1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 3, 3], 0.25, true);
        assert!(dec.decode(&packet));

        let img = dec.get_image().unwrap();
        assert_eq!((img.chroma_shift_w, img.chroma_shift_h), (1, 1));
        assert_eq!(img.planes[1], vec![2, 2]);
        assert_eq!(img.planes[2], vec![3, 3]);
        assert_eq!(img.pts, 0.25);
    }

    #[test]
    fn test_raw_yv12_swaps_chroma() {
        let mut dec = RawVideoDecoder::new(&raw_codec(Some(b"YV12")), 2, 2).unwrap();
        let mut packet = Packet::new();
        packet.fill(&[0, 0, 0, 0, 7, 9], 0.0, true);
        assert!(dec.decode(&packet));
        let img = dec.get_image().unwrap();
        assert_eq!(img.planes[1], vec![9]);
        assert_eq!(img.planes[2], vec![7]);
    }

    #[test]
    fn test_raw_wrong_size_fails() {
        let mut dec = RawVideoDecoder::new(&raw_codec(Some(b"I444")), 2, 2).unwrap();
        let mut packet = Packet::new();
        packet.fill(&[0; 5], 0.0, true);
        assert!(!dec.decode(&packet));
        assert!(matches!(dec.get_image(), Err(ImageError::Failed(_))));
    }

    #[test]
    fn test_raw_411_layout() {
        let dec = RawVideoDecoder::new(&raw_codec(Some(b"Y41B")), 8, 2).unwrap();
        assert_eq!(dec.frame_size(), (16, 4));
    }

    #[test]
    fn test_unknown_codecs_rejected() {
        assert!(RawVideoDecoder::new(&raw_codec(Some(b"NV21")), 2, 2).is_err());

        let vp9 = CodecInfo {
            codec_id: "V_VP9".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_video_decoder(&vp9, 64, 64, 1),
            Err(PlaybackError::UnsupportedCodec(_))
        ));
        assert!(create_video_decoder(&raw_codec(None), 64, 64, 1).is_ok());
    }
}
