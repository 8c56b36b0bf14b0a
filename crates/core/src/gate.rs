//! Emission gating: decides which readings are worth logging.
//!
//! A reading is emitted when it differs from the last meaningful value by
//! more than the threshold, or when the heartbeat interval has elapsed since
//! the last emission. The two conditions are evaluated independently.

use crate::constants::{DEFAULT_MIN_INTERVAL_SECS, DEFAULT_THRESHOLD_DB};
use crate::estimator::DecibelReading;
use chrono::{DateTime, Duration, Local};

/// Which conditions fired for a reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Triggers {
    pub magnitude: bool,
    pub interval: bool,
}

impl Triggers {
    pub fn any(&self) -> bool {
        self.magnitude || self.interval
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EventGate {
    threshold_db: f64,
    min_interval: Duration,
}

impl Default for EventGate {
    fn default() -> Self {
        Self::new(
            DEFAULT_THRESHOLD_DB,
            Duration::seconds(DEFAULT_MIN_INTERVAL_SECS as i64),
        )
    }
}

impl EventGate {
    pub fn new(threshold_db: f64, min_interval: Duration) -> Self {
        Self {
            threshold_db,
            min_interval,
        }
    }

    pub fn threshold_db(&self) -> f64 {
        self.threshold_db
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Evaluates both triggers separately.
    pub fn evaluate(
        &self,
        previous_value: f64,
        previous_time: DateTime<Local>,
        new_value: f64,
        new_time: DateTime<Local>,
    ) -> Triggers {
        Triggers {
            magnitude: (new_value - previous_value).abs() > self.threshold_db,
            interval: new_time - previous_time >= self.min_interval,
        }
    }

    pub fn should_emit(
        &self,
        previous_value: f64,
        previous_time: DateTime<Local>,
        new_value: f64,
        new_time: DateTime<Local>,
    ) -> bool {
        self.evaluate(previous_value, previous_time, new_value, new_time)
            .any()
    }
}

/// Baselines the gate compares against, plus the running read error count.
#[derive(Debug, Clone, Default)]
pub struct EmissionState {
    last_value: Option<f64>,
    last_time: Option<DateTime<Local>>,
    pub error_count: u64,
}

impl EmissionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value that counted as a meaningful change.
    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    pub fn last_time(&self) -> Option<DateTime<Local>> {
        self.last_time
    }

    /// Runs `reading` through `gate` and advances the baselines.
    ///
    /// The first reading only seeds the baselines. After that, the value
    /// baseline moves on magnitude-triggered emissions only, and the time
    /// baseline moves on interval-triggered emissions only.
    pub fn observe(&mut self, gate: &EventGate, reading: &DecibelReading) -> Option<Triggers> {
        let (Some(last_value), Some(last_time)) = (self.last_value, self.last_time) else {
            self.last_value = Some(reading.value_db);
            self.last_time = Some(reading.timestamp);
            return None;
        };

        let triggers = gate.evaluate(last_value, last_time, reading.value_db, reading.timestamp);
        if !triggers.any() {
            return None;
        }
        if triggers.magnitude {
            self.last_value = Some(reading.value_db);
        }
        if triggers.interval {
            self.last_time = Some(reading.timestamp);
        }
        Some(triggers)
    }
}
