//! Shared constants for the measurement pipeline.

/// Default capture rate (48kHz, what most USB webcams and headsets expose)
pub const SAMPLE_RATE: u32 = 48000;

/// Samples per frame (200ms at 48kHz). Smaller buffers overrun on some drivers.
pub const FRAME_SIZE: usize = 9600;

/// Capture is always mono.
pub const CHANNELS: u16 = 1;

/// Capture is always signed 16-bit.
pub const BIT_DEPTH: u16 = 16;

/// Lowest and highest sample rates the weighting filter is designed for.
pub const MIN_SAMPLE_RATE: u32 = 8000;
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Level change (dB) that counts as meaningful.
pub const DEFAULT_THRESHOLD_DB: f64 = 3.0;

/// Heartbeat interval in seconds.
pub const DEFAULT_MIN_INTERVAL_SECS: u64 = 30;

/// RMS values are clamped to this before the logarithm.
pub const RMS_FLOOR: f64 = f64::EPSILON;
