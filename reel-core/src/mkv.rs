// MKV (Matroska/WebM) demuxer using matroska-demuxer crate
// Picks one video track and the requested audio track, reads packets in
// container order.

use matroska_demuxer::{Frame as MkvFrame, MatroskaFile, TrackEntry, TrackType};

use crate::demuxer::{CodecInfo, Demuxer, Packet, StreamInfo};
use crate::error::{PlaybackError, Result};
use crate::reader::{ContainerReader, ReaderStream};

type Source = ReaderStream<Box<dyn ContainerReader>>;

pub struct MkvDemuxer {
    mkv: MatroskaFile<Source>,
    frame: MkvFrame,
    info: StreamInfo,
    video_codec: CodecInfo,
    audio_codec: Option<CodecInfo>,
    video_track: u64,
    audio_track: Option<u64>,
    /// Nanoseconds per block timestamp tick
    timestamp_scale: f64,
    eos: bool,
}

fn codec_info(track: &TrackEntry) -> CodecInfo {
    CodecInfo {
        codec_id: track.codec_id().to_string(),
        codec_private: track.codec_private().map(|p| p.to_vec()),
        bit_depth: track
            .audio()
            .and_then(|a| a.bit_depth())
            .map(|d| d.get() as u32),
    }
}

impl MkvDemuxer {
    /// Parse headers and select tracks. `audio_track` counts audio tracks
    /// only, from zero.
    pub fn open(reader: Box<dyn ContainerReader>, audio_track: usize) -> Result<Self> {
        let mkv = MatroskaFile::open(ReaderStream::new(reader))
            .map_err(|e| PlaybackError::Demux(format!("Failed to parse MKV: {:?}", e)))?;

        let video = mkv
            .tracks()
            .iter()
            .find(|t| t.track_type() == TrackType::Video && t.video().is_some())
            .ok_or(PlaybackError::NoVideoTrack)?;

        let (width, height) = match video.video() {
            Some(v) => (v.pixel_width().get() as u32, v.pixel_height().get() as u32),
            None => return Err(PlaybackError::NoVideoTrack),
        };
        let video_track = video.track_number().get();
        let video_codec = codec_info(video);

        let audio = mkv
            .tracks()
            .iter()
            .filter(|t| t.track_type() == TrackType::Audio && t.audio().is_some())
            .nth(audio_track);

        let mut info = StreamInfo {
            width,
            height,
            ..Default::default()
        };
        if let Some(a) = audio.and_then(|t| t.audio()) {
            info.channels = a.channels().get() as u32;
            info.sample_rate = a.sampling_frequency().round() as u32;
        }

        // Segment duration and block timestamps are in timestamp-scale ticks
        let timestamp_scale = mkv.info().timestamp_scale().get() as f64;
        info.duration = mkv.info().duration().unwrap_or(0.0) * timestamp_scale / 1e9;

        let audio_codec = audio.map(codec_info);
        let audio_track = audio.map(|t| t.track_number().get());

        tracing::debug!(
            "MKV opened: {}x{}, {:.3}s, video track {} ({}), audio track {:?}",
            info.width,
            info.height,
            info.duration,
            video_track,
            video_codec.codec_id,
            audio_track
        );

        Ok(Self {
            mkv,
            frame: MkvFrame::default(),
            info,
            video_codec,
            audio_codec,
            video_track,
            audio_track,
            timestamp_scale,
            eos: false,
        })
    }
}

impl Demuxer for MkvDemuxer {
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

        loop {
            match self.mkv.next_frame(&mut self.frame) {
                Ok(true) => {
                    let time = self.frame.timestamp as f64 * self.timestamp_scale / 1e9;
                    let keyframe = self.frame.is_keyframe.unwrap_or(false);

                    if self.frame.track == self.video_track {
                        video.fill(&self.frame.data, time, keyframe);
                        return true;
                    }
                    if Some(self.frame.track) == self.audio_track {
                        if let Some(a) = audio.as_deref_mut() {
                            a.fill(&self.frame.data, time, keyframe);
                            return true;
                        }
                    }
                    // Unselected track, keep going
                }
                Ok(false) => {
                    self.eos = true;
                    return false;
                }
                Err(e) => {
                    tracing::warn!("MKV read error: {:?}", e);
                    self.eos = true;
                    return false;
                }
            }
        }
    }

    fn is_end_of_stream(&self) -> bool {
        self.eos
    }
}
