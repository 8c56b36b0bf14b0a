pub mod capture;
pub mod clock;
pub mod constants;
pub mod error;
pub mod estimator;
pub mod gate;
pub mod sink;
pub mod source;
pub mod weighting;

pub use capture::{CaptureLoop, CaptureStats, LoopState, Step};
pub use clock::{Clock, SystemClock};
pub use error::{MeterError, SinkError};
pub use estimator::{DecibelReading, FilterState, LevelEstimator, Scorer};
pub use gate::{EmissionState, EventGate, Triggers};
pub use sink::{ConsoleSink, CsvSink, LevelFileSink, Observation, Sink};
pub use source::{AudioSource, CaptureConfig, SampleFrame};
pub use weighting::{a_weighting, FilterCoefficients};
