//! Capture device abstraction.

use crate::constants::{FRAME_SIZE, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE, SAMPLE_RATE};
use crate::error::MeterError;

/// Fixed-length block of mono signed 16-bit samples.
pub type SampleFrame = Vec<i16>;

/// Parameters of a capture session. Channel count and bit depth are fixed
/// (see [`crate::constants::CHANNELS`], [`crate::constants::BIT_DEPTH`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub frame_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            frame_size: FRAME_SIZE,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), MeterError> {
        if self.frame_size == 0 {
            return Err(MeterError::InvalidParameter(
                "frame size must be at least one sample".into(),
            ));
        }
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(MeterError::InvalidParameter(format!(
                "unsupported sample rate {} Hz",
                self.sample_rate
            )));
        }
        Ok(())
    }

    /// Wall-clock length of one frame.
    pub fn frame_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.frame_size as f64 / self.sample_rate as f64)
    }
}

/// A blocking, fixed-frame capture device.
pub trait AudioSource {
    fn config(&self) -> CaptureConfig;

    /// Blocks until exactly `frame_size` samples are available.
    ///
    /// Returns [`MeterError::TransientRead`] for overruns and driver hiccups;
    /// the session stays usable afterwards.
    fn read_frame(&mut self) -> Result<SampleFrame, MeterError>;

    /// Releases the device. Safe to call more than once.
    fn close(&mut self);
}
