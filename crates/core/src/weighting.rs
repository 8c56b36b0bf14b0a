//! A-weighting filter design.
//!
//! The analog A-weighting prototype (IEC 61672) is built from its pole
//! frequencies and mapped to the digital domain with the bilinear transform.
//! The result is a single 6th-order IIR section in transfer-function form.

use crate::constants::{MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
use crate::error::MeterError;
use std::f64::consts::PI;

// Pole frequencies of the A-weighting curve (Hz)
const F1: f64 = 20.598997;
const F2: f64 = 107.65265;
const F3: f64 = 737.86223;
const F4: f64 = 12194.217;

/// Gain (dB) that normalises the curve to 0 dB at 1 kHz.
const A1000: f64 = 1.9997;

/// Transfer function coefficients `b` (numerator) and `a` (denominator),
/// normalised so that `a[0] == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCoefficients {
    numerator: Vec<f64>,
    denominator: Vec<f64>,
}

impl FilterCoefficients {
    /// Builds a coefficient set, normalising by `a[0]`.
    pub fn new(numerator: Vec<f64>, denominator: Vec<f64>) -> Result<Self, MeterError> {
        if numerator.is_empty() || denominator.is_empty() {
            return Err(MeterError::InvalidParameter(
                "filter needs at least one numerator and one denominator coefficient".into(),
            ));
        }
        let a0 = denominator[0];
        if a0 == 0.0 || !a0.is_finite() {
            return Err(MeterError::InvalidParameter(format!(
                "leading denominator coefficient must be finite and non-zero, got {}",
                a0
            )));
        }
        let numerator: Vec<f64> = numerator.iter().map(|b| b / a0).collect();
        let denominator: Vec<f64> = denominator.iter().map(|a| a / a0).collect();
        if numerator.iter().chain(denominator.iter()).any(|c| !c.is_finite()) {
            return Err(MeterError::InvalidParameter(
                "filter coefficients are not finite".into(),
            ));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    pub fn numerator(&self) -> &[f64] {
        &self.numerator
    }

    pub fn denominator(&self) -> &[f64] {
        &self.denominator
    }

    /// Length of the delay line needed to run this filter.
    pub fn order(&self) -> usize {
        self.numerator.len().max(self.denominator.len()) - 1
    }
}

/// Designs the A-weighting filter for `sample_rate` Hz.
pub fn a_weighting(sample_rate: u32) -> Result<FilterCoefficients, MeterError> {
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        return Err(MeterError::InvalidParameter(format!(
            "sample rate {} Hz is outside the supported range {}..={} Hz",
            sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
        )));
    }

    let w = |f: f64| 2.0 * PI * f;

    // Four zeros at the origin
    let gain = w(F4).powi(2) * 10f64.powf(A1000 / 20.0);
    let numerator = [gain, 0.0, 0.0, 0.0, 0.0];

    // Double poles at F1 and F4, single poles at F2 and F3
    let mut denominator = poly_mul(
        &[1.0, 2.0 * w(F4), w(F4).powi(2)],
        &[1.0, 2.0 * w(F1), w(F1).powi(2)],
    );
    denominator = poly_mul(&denominator, &[1.0, w(F3)]);
    denominator = poly_mul(&denominator, &[1.0, w(F2)]);

    let (b, a) = bilinear(&numerator, &denominator, sample_rate as f64);
    FilterCoefficients::new(b, a)
}

/// Product of two polynomials given highest power first.
fn poly_mul(p: &[f64], q: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; p.len() + q.len() - 1];
    for (i, &x) in p.iter().enumerate() {
        for (j, &y) in q.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Maps an analog transfer function `b(s)/a(s)` to `b(z)/a(z)` using
/// `s = 2*fs * (1 - z^-1) / (1 + z^-1)`.
fn bilinear(b: &[f64], a: &[f64], fs: f64) -> (Vec<f64>, Vec<f64>) {
    let fs2 = 2.0 * fs;
    let order = b.len().max(a.len()) - 1;

    let transform = |poly: &[f64]| -> Vec<f64> {
        let degree = poly.len() - 1;
        let mut out = vec![0.0; order + 1];
        for i in 0..=degree {
            // coefficient of s^i
            let c = poly[degree - i] * fs2.powi(i as i32);
            if c == 0.0 {
                continue;
            }
            for k in 0..=i {
                let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                for l in 0..=(order - i) {
                    out[k + l] += sign * binomial(i, k) * binomial(order - i, l) * c;
                }
            }
        }
        out
    };

    (transform(b), transform(a))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Magnitude response in dB at `freq` Hz.
    fn response_db(c: &FilterCoefficients, freq: f64, fs: f64) -> f64 {
        let omega = 2.0 * PI * freq / fs;
        let eval = |poly: &[f64]| {
            let (mut re, mut im) = (0.0, 0.0);
            for (k, &coef) in poly.iter().enumerate() {
                re += coef * (omega * k as f64).cos();
                im -= coef * (omega * k as f64).sin();
            }
            (re * re + im * im).sqrt()
        };
        20.0 * (eval(c.numerator()) / eval(c.denominator())).log10()
    }

    #[test]
    fn test_coefficients_are_finite_for_common_rates() {
        for rate in [8000, 16000, 22050, 44100, 48000, 96000, 192000] {
            let c = a_weighting(rate).unwrap();
            assert_eq!(c.numerator().len(), 7, "rate {}", rate);
            assert_eq!(c.denominator().len(), 7, "rate {}", rate);
            assert!(c.numerator().iter().all(|x| x.is_finite()));
            assert!(c.denominator().iter().all(|x| x.is_finite()));
            assert_eq!(c.denominator()[0], 1.0);
        }
    }

    #[test]
    fn test_unity_gain_at_1khz() {
        let c = a_weighting(48000).unwrap();
        let db = response_db(&c, 1000.0, 48000.0);
        assert!(db.abs() < 0.2, "1 kHz should be ~0 dB, got {}", db);
    }

    #[test]
    fn test_low_frequencies_attenuated() {
        let c = a_weighting(48000).unwrap();
        let db = response_db(&c, 100.0, 48000.0);
        assert!(
            (db - (-19.1)).abs() < 0.3,
            "100 Hz should be ~-19.1 dB, got {}",
            db
        );
        assert!(response_db(&c, 20.0, 48000.0) < -45.0);
    }

    #[test]
    fn test_blocks_dc() {
        let c = a_weighting(44100).unwrap();
        let sum: f64 = c.numerator().iter().sum();
        let scale = c.numerator().iter().fold(0.0f64, |m, x| m.max(x.abs()));
        assert!(sum.abs() < 1e-9 * scale, "numerator sum {} not ~0", sum);
    }

    #[test]
    fn test_rejects_unsupported_rates() {
        assert!(matches!(
            a_weighting(0),
            Err(MeterError::InvalidParameter(_))
        ));
        assert!(a_weighting(1000).is_err());
        assert!(a_weighting(1_000_000).is_err());
    }

    #[test]
    fn test_design_is_deterministic() {
        assert_eq!(a_weighting(48000).unwrap(), a_weighting(48000).unwrap());
    }

    #[test]
    fn test_new_normalises_by_leading_coefficient() {
        let c = FilterCoefficients::new(vec![2.0, 4.0], vec![2.0, 1.0]).unwrap();
        assert_eq!(c.numerator(), &[1.0, 2.0]);
        assert_eq!(c.denominator(), &[1.0, 0.5]);
        assert_eq!(c.order(), 1);
    }

    #[test]
    fn test_new_rejects_zero_leading_coefficient() {
        assert!(FilterCoefficients::new(vec![1.0], vec![0.0, 1.0]).is_err());
        assert!(FilterCoefficients::new(vec![], vec![1.0]).is_err());
    }
}
