//! Error taxonomy for the measurement core.

use thiserror::Error;

/// Errors raised while setting up or running a capture session.
#[derive(Debug, Error)]
pub enum MeterError {
    /// Bad filter design or capture parameter. Fatal at startup.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No capturable device when the session was opened.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A recoverable glitch (overrun, underrun, driver hiccup).
    #[error("transient read error: {0}")]
    TransientRead(String),

    /// The device went away mid-run.
    #[error("audio device lost: {0}")]
    DeviceLost(String),
}

impl MeterError {
    /// Whether the capture loop should absorb this error and keep going.
    pub fn is_transient(&self) -> bool {
        matches!(self, MeterError::TransientRead(_))
    }
}

/// Failure writing an emitted record. Never propagates into the capture loop.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink already closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_read_glitches_are_transient() {
        assert!(MeterError::TransientRead("overrun".into()).is_transient());
        assert!(!MeterError::DeviceLost("unplugged".into()).is_transient());
        assert!(!MeterError::DeviceUnavailable("none".into()).is_transient());
        assert!(!MeterError::InvalidParameter("rate".into()).is_transient());
    }

    #[test]
    fn test_sink_error_wraps_io() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: SinkError = io.into();
        assert!(err.to_string().contains("disk full"));
    }
}
