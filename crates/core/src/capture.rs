//! The capture loop: source → estimator → gate → sinks, until told to stop.

use crate::clock::{Clock, SystemClock};
use crate::error::MeterError;
use crate::estimator::{DecibelReading, Scorer};
use crate::gate::{EmissionState, EventGate, Triggers};
use crate::sink::{Observation, Sink};
use crate::source::AudioSource;
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Draining,
    Stopped,
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames: u64,
    pub emissions: u64,
    pub read_errors: u64,
    pub sink_errors: u64,
}

/// Outcome of a single iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// The read failed transiently; nothing was measured.
    Skipped,
    Measured {
        reading: DecibelReading,
        emitted: Option<Triggers>,
    },
}

pub struct CaptureLoop<S: AudioSource, E: Scorer, C: Clock = SystemClock> {
    source: S,
    estimator: E,
    clock: C,
    gate: EventGate,
    sinks: Vec<Box<dyn Sink>>,
    emission: EmissionState,
    stats: CaptureStats,
    state: LoopState,
}

impl<S: AudioSource, E: Scorer> CaptureLoop<S, E, SystemClock> {
    pub fn new(source: S, estimator: E, gate: EventGate) -> Self {
        Self::with_clock(source, estimator, gate, SystemClock)
    }
}

impl<S: AudioSource, E: Scorer, C: Clock> CaptureLoop<S, E, C> {
    pub fn with_clock(source: S, estimator: E, gate: EventGate, clock: C) -> Self {
        Self {
            source,
            estimator,
            clock,
            gate,
            sinks: Vec::new(),
            emission: EmissionState::new(),
            stats: CaptureStats::default(),
            state: LoopState::Running,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn Sink>) {
        info!("Sink attached: {}", sink.name());
        self.sinks.push(sink);
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    pub fn emission(&self) -> &EmissionState {
        &self.emission
    }

    /// Reads and processes one frame.
    ///
    /// Transient read errors are counted, reported to the sinks and absorbed.
    /// Any other read error is returned and ends the session.
    pub fn step(&mut self) -> Result<Step, MeterError> {
        let frame = match self.source.read_frame() {
            Ok(frame) => frame,
            Err(e) if e.is_transient() => {
                self.emission.error_count += 1;
                self.stats.read_errors = self.emission.error_count;
                let count = self.emission.error_count;
                warn!("({}) Error recording: {}", count, e);
                for sink in self.sinks.iter_mut() {
                    sink.read_error(count, &e);
                }
                return Ok(Step::Skipped);
            }
            Err(e) => return Err(e),
        };

        let reading = DecibelReading {
            value_db: self.estimator.score(&frame),
            timestamp: self.clock.now(),
        };
        self.stats.frames += 1;

        let emitted = self.emission.observe(&self.gate, &reading);
        if let Some(triggers) = emitted {
            self.emit(&Observation { reading, triggers });
        }
        Ok(Step::Measured { reading, emitted })
    }

    fn emit(&mut self, observation: &Observation) {
        self.stats.emissions += 1;
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.record(observation) {
                self.stats.sink_errors += 1;
                warn!("{} sink dropped a record: {}", sink.name(), e);
            }
        }
    }

    /// Runs until `stop` is set or a fatal error occurs, then drains.
    ///
    /// `stop` is checked once per iteration, so shutdown takes at most one
    /// frame read.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<CaptureStats, MeterError> {
        if self.state != LoopState::Running {
            warn!("Capture loop already stopped");
            return Ok(self.stats);
        }
        info!(
            "Listening ({} Hz, {} samples per frame)",
            self.source.config().sample_rate,
            self.source.config().frame_size
        );

        let result = loop {
            if stop.load(Ordering::Relaxed) {
                info!("Stop requested");
                break Ok(());
            }
            if let Err(e) = self.step() {
                error!("Capture aborted: {}", e);
                break Err(e);
            }
        };

        self.drain();
        result.map(|_| self.stats)
    }

    /// Closes every sink and the source. Idempotent.
    pub fn drain(&mut self) {
        if self.state == LoopState::Stopped {
            return;
        }
        self.state = LoopState::Draining;

        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.close() {
                warn!("Failed to close {} sink: {}", sink.name(), e);
            }
        }
        self.source.close();

        self.state = LoopState::Stopped;
        info!(
            "Stopped: {} frames, {} emitted, {} read errors, {} sink errors",
            self.stats.frames, self.stats.emissions, self.stats.read_errors, self.stats.sink_errors
        );
    }
}

impl<S: AudioSource, E: Scorer, C: Clock> Drop for CaptureLoop<S, E, C> {
    fn drop(&mut self) {
        self.drain();
    }
}
