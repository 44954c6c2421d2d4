//! # Digital Filter Module
//!
//! Second-order Butterworth filters designed with the bilinear transform and
//! applied with zero-phase (forward-backward) filtering.
//!
//! ## Features
//! - High-pass stage that is always present
//! - Optional low-pass stage, disabled when its cutoff reaches Nyquist
//! - Odd-extension padding and steady-state initial conditions so the frame
//!   edges do not ring
//! - No phase lag: every sample stays aligned with its input

use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, SQRT_2};

use crate::error::{AnalyserError, Result};

/// Cutoff frequencies and the sample rate they are designed against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// High-pass corner in Hz. Must be below Nyquist.
    pub high_pass_cutoff_hz: f32,
    /// Low-pass corner in Hz. At or above Nyquist disables the stage.
    pub low_pass_cutoff_hz: f32,
}

impl FilterConfig {
    pub fn nyquist(&self) -> f32 {
        self.sample_rate / 2.0
    }

    /// Whether the low-pass stage will be synthesised for this configuration.
    pub fn low_pass_enabled(&self) -> bool {
        self.low_pass_cutoff_hz < self.nyquist()
    }

    /// Checks the invariant `0 < high < low < fs/2` (low-pass part only when
    /// the stage is enabled).
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(AnalyserError::InvalidFilterConfig(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        let nyquist = self.nyquist();
        if !(self.high_pass_cutoff_hz > 0.0 && self.high_pass_cutoff_hz < nyquist) {
            return Err(AnalyserError::InvalidFilterConfig(format!(
                "high-pass cutoff {} Hz must lie in (0, {}) Hz",
                self.high_pass_cutoff_hz, nyquist
            )));
        }
        if self.low_pass_cutoff_hz.is_nan() {
            return Err(AnalyserError::InvalidFilterConfig(
                "low-pass cutoff is NaN".to_string(),
            ));
        }
        if self.low_pass_enabled() && self.low_pass_cutoff_hz <= self.high_pass_cutoff_hz {
            return Err(AnalyserError::InvalidFilterConfig(format!(
                "low-pass cutoff {} Hz must be above the high-pass cutoff {} Hz",
                self.low_pass_cutoff_hz, self.high_pass_cutoff_hz
            )));
        }
        Ok(())
    }
}

/// Numerator/denominator pair of one second-order section, `a[0] == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl Biquad {
    /// Butterworth low-pass. `normalized_cutoff` is the corner divided by
    /// Nyquist, in `(0, 1)`.
    pub fn butterworth_low_pass(normalized_cutoff: f64) -> Self {
        let k = (PI * normalized_cutoff / 2.0).tan();
        let k2 = k * k;
        let norm = 1.0 / (1.0 + SQRT_2 * k + k2);
        let b0 = k2 * norm;
        Self {
            b: [b0, 2.0 * b0, b0],
            a: [1.0, 2.0 * (k2 - 1.0) * norm, (1.0 - SQRT_2 * k + k2) * norm],
        }
    }

    /// Butterworth high-pass, same cutoff convention as the low-pass.
    pub fn butterworth_high_pass(normalized_cutoff: f64) -> Self {
        let k = (PI * normalized_cutoff / 2.0).tan();
        let k2 = k * k;
        let norm = 1.0 / (1.0 + SQRT_2 * k + k2);
        Self {
            b: [norm, -2.0 * norm, norm],
            a: [1.0, 2.0 * (k2 - 1.0) * norm, (1.0 - SQRT_2 * k + k2) * norm],
        }
    }

    /// Filter state that yields a steady output for a unit-step input.
    fn step_state(&self) -> [f64; 2] {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        let gain = (b0 + b1 + b2) / (1.0 + a1 + a2);
        let z2 = b2 - a2 * gain;
        let z1 = b1 - a1 * gain + z2;
        [z1, z2]
    }

    /// Transposed direct form II, one pass.
    fn run(&self, input: &[f64], mut state: [f64; 2]) -> Vec<f64> {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        input
            .iter()
            .map(|&x| {
                let y = b0 * x + state[0];
                state[0] = b1 * x - a1 * y + state[1];
                state[1] = b2 * x - a2 * y;
                y
            })
            .collect()
    }

    /// Zero-phase filtering: forward pass, then a backward pass over the
    /// result, on an odd-extended copy of the signal.
    pub fn filtfilt(&self, signal: &[f64]) -> Vec<f64> {
        let n = signal.len();
        if n == 0 {
            return Vec::new();
        }
        let pad = PAD_LEN.min(n - 1);

        let first = signal[0];
        let last = signal[n - 1];
        let mut extended = Vec::with_capacity(n + 2 * pad);
        extended.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
        extended.extend_from_slice(signal);
        extended.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));

        let zi = self.step_state();
        let x0 = extended[0];
        let mut forward = self.run(&extended, [zi[0] * x0, zi[1] * x0]);

        forward.reverse();
        let y0 = forward[0];
        let mut backward = self.run(&forward, [zi[0] * y0, zi[1] * y0]);
        backward.reverse();

        backward.drain(..pad);
        backward.truncate(n);
        backward
    }
}

/// Edge padding used by the forward-backward pass: three times the
/// coefficient count of a second-order section.
const PAD_LEN: usize = 9;

/// The high-pass and optional low-pass stages derived from a [`FilterConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBank {
    config: FilterConfig,
    high_pass: Biquad,
    low_pass: Option<Biquad>,
}

impl FilterBank {
    pub fn new(config: FilterConfig) -> Result<Self> {
        config.validate()?;

        let fs = config.sample_rate as f64;
        let high_pass = Biquad::butterworth_high_pass(2.0 * config.high_pass_cutoff_hz as f64 / fs);
        let low_pass = if config.low_pass_enabled() {
            Some(Biquad::butterworth_low_pass(2.0 * config.low_pass_cutoff_hz as f64 / fs))
        } else {
            log::info!(
                "Low-pass cutoff {} Hz is at or above Nyquist ({} Hz), stage disabled",
                config.low_pass_cutoff_hz,
                config.nyquist()
            );
            None
        };

        Ok(Self { config, high_pass, low_pass })
    }

    /// Re-synthesises both stages. On error the current filters are kept.
    pub fn configure(
        &mut self,
        sample_rate: f32,
        high_pass_cutoff_hz: f32,
        low_pass_cutoff_hz: f32,
    ) -> Result<()> {
        *self = Self::new(FilterConfig {
            sample_rate,
            high_pass_cutoff_hz,
            low_pass_cutoff_hz,
        })?;
        Ok(())
    }

    pub fn config(&self) -> FilterConfig {
        self.config
    }

    pub fn high_pass(&self) -> &Biquad {
        &self.high_pass
    }

    pub fn low_pass(&self) -> Option<&Biquad> {
        self.low_pass.as_ref()
    }

    pub fn low_pass_active(&self) -> bool {
        self.low_pass.is_some()
    }

    /// High-pass, then low-pass when active. Output length equals input length.
    pub fn apply(&self, frame: &[f32]) -> Result<Vec<f32>> {
        let signal: Vec<f64> = frame.iter().map(|&s| s as f64).collect();
        let mut filtered = self.high_pass.filtfilt(&signal);
        if let Some(low_pass) = &self.low_pass {
            filtered = low_pass.filtfilt(&filtered);
        }

        if filtered.iter().any(|v| !v.is_finite()) {
            return Err(AnalyserError::NumericalFault("filter"));
        }
        Ok(filtered.into_iter().map(|v| v as f32).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(sample_rate: f32, high: f32, low: f32) -> FilterConfig {
        FilterConfig {
            sample_rate,
            high_pass_cutoff_hz: high,
            low_pass_cutoff_hz: low,
        }
    }

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    fn rms(signal: &[f32]) -> f32 {
        (signal.iter().map(|s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
    }

    #[test]
    fn low_pass_activity_follows_nyquist() {
        for (fs, low) in [(8000.0, 2500.0), (4000.0, 2500.0), (4000.0, 2000.0), (9000.0, 4499.0)] {
            let bank = FilterBank::new(config(fs, 100.0, low)).unwrap();
            assert_eq!(bank.low_pass_active(), low < fs / 2.0, "fs={fs} low={low}");
        }
    }

    #[test]
    fn rejects_invalid_high_pass() {
        assert!(matches!(
            FilterBank::new(config(0.0, 100.0, 2500.0)),
            Err(AnalyserError::InvalidFilterConfig(_))
        ));
        assert!(matches!(
            FilterBank::new(config(8000.0, 0.0, 2500.0)),
            Err(AnalyserError::InvalidFilterConfig(_))
        ));
        assert!(matches!(
            FilterBank::new(config(8000.0, 4000.0, 9000.0)),
            Err(AnalyserError::InvalidFilterConfig(_))
        ));
    }

    #[test]
    fn failed_configure_keeps_previous_filters() {
        let mut bank = FilterBank::new(config(8000.0, 100.0, 2500.0)).unwrap();
        let before = bank.clone();
        assert!(bank.configure(8000.0, -5.0, 2500.0).is_err());
        assert_eq!(bank, before);
    }

    #[test]
    fn matches_reference_butterworth_coefficients() {
        // 100 Hz high-pass at 8 kHz
        let hp = Biquad::butterworth_high_pass(0.025);
        let expected_b = [0.945977, -1.891954, 0.945977];
        let expected_a = [1.0, -1.889033, 0.894876];
        for i in 0..3 {
            assert!((hp.b[i] - expected_b[i]).abs() < 1e-4);
            assert!((hp.a[i] - expected_a[i]).abs() < 1e-4);
        }
    }

    #[test]
    fn low_pass_has_unity_dc_gain() {
        let lp = Biquad::butterworth_low_pass(0.3);
        let dc = (lp.b.iter().sum::<f64>()) / (lp.a.iter().sum::<f64>());
        assert!((dc - 1.0).abs() < 1e-9);
    }

    #[test]
    fn preserves_length_and_silence() {
        let bank = FilterBank::new(config(8000.0, 100.0, 2500.0)).unwrap();
        for len in [1, 2, 9, 10, 256, 800] {
            let out = bank.apply(&vec![0.0; len]).unwrap();
            assert_eq!(out.len(), len);
            assert!(out.iter().all(|&v| v == 0.0));
        }
        assert!(bank.apply(&[]).unwrap().is_empty());
    }

    #[test]
    fn high_pass_removes_dc_offset() {
        let bank = FilterBank::new(config(8000.0, 100.0, 9000.0)).unwrap();
        let signal: Vec<f32> = sine(440.0, 8000.0, 512).iter().map(|s| s + 50.0).collect();
        let out = bank.apply(&signal).unwrap();
        let mean = out.iter().sum::<f32>() / out.len() as f32;
        assert!(mean.abs() < 1.0, "mean after high-pass was {mean}");
    }

    #[test]
    fn zero_phase_keeps_passband_tone_aligned() {
        let bank = FilterBank::new(config(8000.0, 100.0, 2500.0)).unwrap();
        let signal = sine(440.0, 8000.0, 512);
        let out = bank.apply(&signal).unwrap();
        // Away from the edges the output tracks the input sample for sample.
        for i in 64..448 {
            assert!((out[i] - signal[i]).abs() < 0.05, "sample {i}: {} vs {}", out[i], signal[i]);
        }
    }

    #[test]
    fn low_pass_attenuates_above_cutoff() {
        let bank = FilterBank::new(config(8000.0, 100.0, 1000.0)).unwrap();
        let out = bank.apply(&sine(3000.0, 8000.0, 512)).unwrap();
        assert!(rms(&out[32..480]) < 0.05);
    }
}
