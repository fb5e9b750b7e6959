//! Audio/Video Synchronization
//!
//! Wall-clock driven: the host advances the clock every tick and frames are
//! gated against it. Audio is pushed as fast as the mixer will take it, so
//! the clock, not the audio position, is the master.

/// Accumulated playback time in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackClock {
    time: f64,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, delta: f64) -> f64 {
        if delta > 0.0 {
            self.time += delta;
        }
        self.time
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn reset(&mut self) {
        self.time = 0.0;
    }
}

/// Timestamp gate shared by lookahead sizing and presentation.
///
/// A frame is due when `frame_time >= clock + delay_compensation`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SyncGate {
    delay_compensation: f64,
}

impl SyncGate {
    /// `delay_compensation` in seconds
    pub fn new(delay_compensation: f64) -> Self {
        Self { delay_compensation }
    }

    pub fn from_millis(ms: f64) -> Self {
        Self::new(ms / 1000.0)
    }

    pub fn delay_compensation(&self) -> f64 {
        self.delay_compensation
    }

    /// Threshold a frame timestamp has to reach at `clock`.
    pub fn threshold(&self, clock: f64) -> f64 {
        clock + self.delay_compensation
    }

    pub fn is_due(&self, frame_time: f64, clock: f64) -> bool {
        frame_time >= self.threshold(clock)
    }

    /// Lookahead is sufficient once the newest buffered frame passes the gate.
    pub fn has_enough_lookahead(&self, newest_frame_time: Option<f64>, clock: f64) -> bool {
        newest_frame_time.is_some_and(|t| self.is_due(t, clock))
    }
}
