//! Weighted level estimation: IIR filtering, RMS and decibel conversion.

use crate::constants::RMS_FLOOR;
use crate::weighting::FilterCoefficients;
use chrono::{DateTime, Local};
use std::sync::Arc;

/// One decibel value with the wall-clock time it was measured at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecibelReading {
    pub value_db: f64,
    pub timestamp: DateTime<Local>,
}

/// Turns a frame of samples into a decibel value.
pub trait Scorer {
    fn score(&mut self, frame: &[i16]) -> f64;
}

/// Delay line of a direct-form II transposed IIR filter.
///
/// Carries over between frames, so a signal split into several frames is
/// filtered exactly as if it had arrived in one piece.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    delays: Vec<f64>,
}

impl FilterState {
    pub fn new(coeffs: &FilterCoefficients) -> Self {
        Self {
            delays: vec![0.0; coeffs.order()],
        }
    }

    pub fn delays(&self) -> &[f64] {
        &self.delays
    }

    /// Filters `input` sample by sample, replacing the contents of `output`.
    pub fn filter_into(&mut self, coeffs: &FilterCoefficients, input: &[i16], output: &mut Vec<f64>) {
        let b = coeffs.numerator();
        let a = coeffs.denominator();
        let order = self.delays.len();
        let coef = |c: &[f64], i: usize| c.get(i).copied().unwrap_or(0.0);

        output.clear();
        output.reserve(input.len());

        for &sample in input {
            let x = sample as f64;
            if order == 0 {
                output.push(coef(b, 0) * x);
                continue;
            }
            let y = coef(b, 0) * x + self.delays[0];
            for i in 0..order - 1 {
                self.delays[i] = coef(b, i + 1) * x + self.delays[i + 1] - coef(a, i + 1) * y;
            }
            self.delays[order - 1] = coef(b, order) * x - coef(a, order) * y;
            output.push(y);
        }
    }
}

/// Root-mean-square of a block of samples. Zero for an empty block.
pub fn rms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|x| x * x).sum();
    (sum / samples.len() as f64).sqrt()
}

/// `20 * log10(rms)`, with `rms` clamped to [`RMS_FLOOR`] first.
pub fn rms_to_db(rms: f64) -> f64 {
    20.0 * rms.max(RMS_FLOOR).log10()
}

/// The reading produced by a completely silent frame (about -313.07 dB).
pub fn silence_floor_db() -> f64 {
    rms_to_db(0.0)
}

/// A-weighted level estimator owning the filter state for one capture session.
pub struct LevelEstimator {
    coeffs: Arc<FilterCoefficients>,
    state: FilterState,
    calibration_db: f64,
    filtered: Vec<f64>, // Reused across frames
}

impl LevelEstimator {
    pub fn new(coeffs: Arc<FilterCoefficients>) -> Self {
        let state = FilterState::new(&coeffs);
        Self {
            coeffs,
            state,
            calibration_db: 0.0,
            filtered: Vec::new(),
        }
    }

    /// Adds a fixed offset to every reading, turning relative dB into
    /// calibrated dB for a known microphone.
    pub fn with_calibration(mut self, calibration_db: f64) -> Self {
        self.calibration_db = calibration_db;
        self
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Output of the most recent frame after weighting.
    pub fn filtered(&self) -> &[f64] {
        &self.filtered
    }
}

impl Scorer for LevelEstimator {
    fn score(&mut self, frame: &[i16]) -> f64 {
        self.state.filter_into(&self.coeffs, frame, &mut self.filtered);
        let rms = rms(&self.filtered);
        if rms < RMS_FLOOR {
            log::debug!("Silent frame, reading clamped to floor");
        }
        rms_to_db(rms) + self.calibration_db
    }
}
