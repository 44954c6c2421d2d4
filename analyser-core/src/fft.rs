//! # Fast Fourier Transform (FFT) Module
//!
//! Magnitude spectra of filtered frames and the axes that go with them.
//! The FFT plan is cached per frame length so repeated frames of the same
//! size reuse it.
//!
//! ## Features
//! - Real-input magnitude spectrum over bins `0..=N/2` using RustFFT
//! - Bin-centre frequency axis and sample time axis for plotting
//! - Peak picking that skips the DC/near-DC bins

use rustfft::{num_complex::Complex, Fft, FftPlanner, Length};
use std::fmt;
use std::sync::Arc;

use crate::error::{AnalyserError, Result};

/// Computes magnitude spectra for frames of any length.
pub struct SpectralAnalyzer {
    planner: FftPlanner<f32>,
    plan: Option<Arc<dyn Fft<f32>>>,
}

impl fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("planned_len", &self.plan.as_ref().map(|p| p.len()))
            .finish()
    }
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectralAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            plan: None,
        }
    }

    fn plan_for(&mut self, len: usize) -> Arc<dyn Fft<f32>> {
        match &self.plan {
            Some(plan) if plan.len() == len => Arc::clone(plan),
            _ => {
                let plan = self.planner.plan_fft_forward(len);
                self.plan = Some(Arc::clone(&plan));
                plan
            }
        }
    }

    /// Returns `|X[k]|` for `k` in `0..=N/2`, i.e. `N/2 + 1` values.
    ///
    /// # Errors
    /// * `NumericalFault` if the input or the transform contains NaN/inf
    pub fn magnitude_spectrum(&mut self, frame: &[f32]) -> Result<Vec<f32>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        if frame.iter().any(|s| !s.is_finite()) {
            return Err(AnalyserError::NumericalFault("fft input"));
        }

        let fft = self.plan_for(frame.len());
        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .map(|&sample| Complex { re: sample, im: 0.0 })
            .collect();
        fft.process(&mut buffer);

        let magnitudes: Vec<f32> = buffer
            .iter()
            .take(frame.len() / 2 + 1)
            .map(|c| c.norm())
            .collect();

        if magnitudes.iter().any(|m| !m.is_finite()) {
            return Err(AnalyserError::NumericalFault("fft"));
        }
        Ok(magnitudes)
    }
}

/// Bin-centre frequencies for a real FFT of `frame_len` samples: `N/2 + 1`
/// values evenly spaced by `fs/N`, starting at 0.
pub fn frequency_axis(frame_len: usize, sample_rate: f32) -> Vec<f32> {
    if frame_len == 0 {
        return Vec::new();
    }
    let bin_width = sample_rate / frame_len as f32;
    (0..=frame_len / 2).map(|k| k as f32 * bin_width).collect()
}

/// Sample times of one frame, `frame_len` points from 0 to `N/fs` inclusive.
pub fn time_axis(frame_len: usize, sample_rate: f32) -> Vec<f32> {
    match frame_len {
        0 => Vec::new(),
        1 => vec![0.0],
        n => {
            let step = (n as f32 / sample_rate) / (n - 1) as f32;
            (0..n).map(|i| i as f32 * step).collect()
        }
    }
}

/// Index of the largest magnitude, ignoring the first `ignore_bins` bins.
///
/// # Returns
/// * `None` if every bin is ignored
pub fn peak_bin(spectrum: &[f32], ignore_bins: usize) -> Option<usize> {
    spectrum
        .iter()
        .enumerate()
        .skip(ignore_bins)
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(bin, _)| bin)
}
