//! # Frame Pipeline
//!
//! Owns the filters, the FFT and the spectrogram history, and turns each raw
//! frame into a filtered waveform and a magnitude spectrum.
//!
//! ## States
//! - `Idle`: nothing configured, `process` is rejected
//! - `Configured`: filters and buffers sized, no frame seen since
//! - `Streaming`: at least one frame processed with the current shape
//!
//! Changing the frame length or sample rate always returns to `Configured`
//! with a cleared spectrogram, so rows of a stale width are never shown.

use serde::{Deserialize, Serialize};

use crate::error::{AnalyserError, Result};
use crate::fft::{self, SpectralAnalyzer};
use crate::filter::{FilterBank, FilterConfig};
use crate::spectrogram::{RollDirection, SpectrogramBuffer};

/// Everything needed to (re)build a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Samples per frame.
    pub frame_len: usize,
    /// Sample rate in Hz.
    pub sample_rate: f32,
    pub high_pass_cutoff_hz: f32,
    pub low_pass_cutoff_hz: f32,
    /// Rows kept in the spectrogram.
    pub spectrogram_depth: usize,
    /// Epsilon added to magnitudes before conversion to dB.
    pub db_floor: f32,
    /// Which end of the spectrogram receives the newest row.
    pub roll: RollDirection,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            frame_len: 1024,
            sample_rate: 4000.0,
            high_pass_cutoff_hz: 100.0,
            low_pass_cutoff_hz: 2500.0,
            spectrogram_depth: 100,
            db_floor: 0.1,
            roll: RollDirection::Prepend,
        }
    }
}

impl PipelineSettings {
    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            sample_rate: self.sample_rate,
            high_pass_cutoff_hz: self.high_pass_cutoff_hz,
            low_pass_cutoff_hz: self.low_pass_cutoff_hz,
        }
    }

    /// Width of one spectrum row, `N/2 + 1`.
    pub fn spectrum_len(&self) -> usize {
        self.frame_len / 2 + 1
    }

    /// Checks that a pipeline can be built from these settings without
    /// touching any existing pipeline.
    pub fn validate(&self) -> Result<()> {
        Stages::build(*self).map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Configured,
    Streaming,
}

/// Output of one `process` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFrame {
    /// Magnitudes for bins `0..=N/2`.
    pub spectrum: Vec<f32>,
    /// The frame after high-pass (and low-pass, when active) filtering.
    pub waveform: Vec<f32>,
}

/// Everything that only exists once the pipeline is configured.
#[derive(Debug)]
struct Stages {
    settings: PipelineSettings,
    filters: FilterBank,
    spectrogram: SpectrogramBuffer,
    frequency_axis: Vec<f32>,
    time_axis: Vec<f32>,
}

impl Stages {
    fn build(settings: PipelineSettings) -> Result<Self> {
        if settings.frame_len == 0 {
            return Err(AnalyserError::InvalidSettings(
                "frame length must be at least 1 sample".to_string(),
            ));
        }
        let filters = FilterBank::new(settings.filter_config())?;
        let spectrogram = SpectrogramBuffer::new(
            settings.spectrogram_depth,
            settings.spectrum_len(),
            settings.db_floor,
            settings.roll,
        )?;
        Ok(Self {
            settings,
            filters,
            spectrogram,
            frequency_axis: fft::frequency_axis(settings.frame_len, settings.sample_rate),
            time_axis: fft::time_axis(settings.frame_len, settings.sample_rate),
        })
    }
}

/// The streaming signal-processing pipeline.
#[derive(Debug, Default)]
pub struct FramePipeline {
    analyzer: SpectralAnalyzer,
    stages: Option<Stages>,
    streaming: bool,
}

impl FramePipeline {
    /// An unconfigured pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A pipeline configured with `settings`.
    pub fn with_settings(settings: PipelineSettings) -> Result<Self> {
        let mut pipeline = Self::new();
        pipeline.configure(settings)?;
        Ok(pipeline)
    }

    pub fn state(&self) -> PipelineState {
        match (&self.stages, self.streaming) {
            (None, _) => PipelineState::Idle,
            (Some(_), false) => PipelineState::Configured,
            (Some(_), true) => PipelineState::Streaming,
        }
    }

    /// Rebuilds filters, spectrogram and axes. All-or-nothing: on error the
    /// previous configuration stays in place.
    pub fn configure(&mut self, settings: PipelineSettings) -> Result<()> {
        let stages = Stages::build(settings)?;
        log::info!(
            "Pipeline configured: {} samples @ {} Hz, high-pass {} Hz, low-pass {} Hz ({})",
            settings.frame_len,
            settings.sample_rate,
            settings.high_pass_cutoff_hz,
            settings.low_pass_cutoff_hz,
            if stages.filters.low_pass_active() { "active" } else { "disabled" }
        );
        self.stages = Some(stages);
        self.streaming = false;
        Ok(())
    }

    fn reconfigure_with(&mut self, change: impl FnOnce(&mut PipelineSettings)) -> Result<()> {
        let mut settings = self.settings().ok_or(AnalyserError::NotConfigured)?;
        change(&mut settings);
        self.configure(settings)
    }

    /// Changes the sample rate, re-designs the filters and clears the
    /// spectrogram.
    pub fn set_sample_rate(&mut self, sample_rate: f32) -> Result<()> {
        self.reconfigure_with(|s| s.sample_rate = sample_rate)
    }

    /// Changes the frame length and clears the spectrogram.
    pub fn set_frame_len(&mut self, frame_len: usize) -> Result<()> {
        self.reconfigure_with(|s| s.frame_len = frame_len)
    }

    /// Re-designs the filters only; the spectrogram keeps its rows.
    fn set_cutoffs(&mut self, change: impl FnOnce(&mut PipelineSettings)) -> Result<()> {
        let stages = self.stages.as_mut().ok_or(AnalyserError::NotConfigured)?;
        let mut settings = stages.settings;
        change(&mut settings);
        stages.filters = FilterBank::new(settings.filter_config())?;
        stages.settings = settings;
        log::info!(
            "Filters updated: high-pass {} Hz, low-pass {} Hz ({})",
            settings.high_pass_cutoff_hz,
            settings.low_pass_cutoff_hz,
            if stages.filters.low_pass_active() { "active" } else { "disabled" }
        );
        Ok(())
    }

    pub fn set_high_pass_cutoff(&mut self, cutoff_hz: f32) -> Result<()> {
        self.set_cutoffs(|s| s.high_pass_cutoff_hz = cutoff_hz)
    }

    pub fn set_low_pass_cutoff(&mut self, cutoff_hz: f32) -> Result<()> {
        self.set_cutoffs(|s| s.low_pass_cutoff_hz = cutoff_hz)
    }

    pub fn settings(&self) -> Option<PipelineSettings> {
        self.stages.as_ref().map(|s| s.settings)
    }

    pub fn filters(&self) -> Option<&FilterBank> {
        self.stages.as_ref().map(|s| &s.filters)
    }

    /// `false` when unconfigured or when the low-pass cutoff is at or above
    /// Nyquist.
    pub fn low_pass_active(&self) -> bool {
        self.filters().is_some_and(FilterBank::low_pass_active)
    }

    pub fn frequency_axis(&self) -> &[f32] {
        self.stages.as_ref().map(|s| s.frequency_axis.as_slice()).unwrap_or(&[])
    }

    pub fn time_axis(&self) -> &[f32] {
        self.stages.as_ref().map(|s| s.time_axis.as_slice()).unwrap_or(&[])
    }

    pub fn spectrogram(&self) -> Option<&SpectrogramBuffer> {
        self.stages.as_ref().map(|s| &s.spectrogram)
    }

    /// Filters `raw`, computes its magnitude spectrum and pushes a dB row
    /// into the spectrogram.
    ///
    /// # Errors
    /// * `NotConfigured` before the first `configure`
    /// * `FrameLengthMismatch` if `raw` is not exactly one frame
    /// * `NumericalFault` if filtering or the FFT degenerates
    pub fn process(&mut self, raw: &[i8]) -> Result<ProcessedFrame> {
        let stages = self.stages.as_mut().ok_or(AnalyserError::NotConfigured)?;
        if raw.len() != stages.settings.frame_len {
            return Err(AnalyserError::FrameLengthMismatch {
                expected: stages.settings.frame_len,
                actual: raw.len(),
            });
        }

        let samples: Vec<f32> = raw.iter().map(|&s| s as f32).collect();
        let waveform = stages.filters.apply(&samples)?;
        let spectrum = self.analyzer.magnitude_spectrum(&waveform)?;
        stages.spectrogram.push_row(&spectrum)?;

        self.streaming = true;
        Ok(ProcessedFrame { spectrum, waveform })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(frame_len: usize, sample_rate: f32) -> PipelineSettings {
        PipelineSettings {
            frame_len,
            sample_rate,
            spectrogram_depth: 4,
            ..PipelineSettings::default()
        }
    }

    #[test]
    fn starts_idle_and_rejects_frames() {
        let mut pipeline = FramePipeline::new();
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert_eq!(pipeline.process(&[0; 8]), Err(AnalyserError::NotConfigured));
        assert!(pipeline.frequency_axis().is_empty());
    }

    #[test]
    fn validate_checks_without_building_a_pipeline() {
        assert!(settings(64, 8000.0).validate().is_ok());
        assert!(matches!(
            settings(0, 8000.0).validate(),
            Err(AnalyserError::InvalidSettings(_))
        ));
        assert!(matches!(
            settings(64, 150.0).validate(),
            Err(AnalyserError::InvalidFilterConfig(_))
        ));
    }

    #[test]
    fn moves_through_states() {
        let mut pipeline = FramePipeline::with_settings(settings(64, 8000.0)).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Configured);
        pipeline.process(&[0; 64]).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Streaming);
        pipeline.set_sample_rate(4000.0).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Configured);
    }

    #[test]
    fn rejects_wrong_frame_length_without_side_effects() {
        let mut pipeline = FramePipeline::with_settings(settings(64, 8000.0)).unwrap();
        let before = pipeline.spectrogram().unwrap().snapshot();
        assert_eq!(
            pipeline.process(&[1; 63]),
            Err(AnalyserError::FrameLengthMismatch { expected: 64, actual: 63 })
        );
        assert_eq!(pipeline.spectrogram().unwrap().snapshot(), before);
        assert_eq!(pipeline.state(), PipelineState::Configured);
    }

    #[test]
    fn silence_in_silence_out() {
        let mut pipeline = FramePipeline::with_settings(settings(256, 8000.0)).unwrap();
        let frame = pipeline.process(&[0; 256]).unwrap();
        assert_eq!(frame.waveform.len(), 256);
        assert_eq!(frame.spectrum.len(), 129);
        assert!(frame.waveform.iter().all(|&v| v == 0.0));
        assert!(frame.spectrum.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn low_pass_status_tracks_sample_rate() {
        let mut pipeline = FramePipeline::with_settings(settings(256, 8000.0)).unwrap();
        assert!(pipeline.low_pass_active());
        pipeline.set_sample_rate(4000.0).unwrap();
        assert!(!pipeline.low_pass_active());
        pipeline.set_low_pass_cutoff(1500.0).unwrap();
        assert!(pipeline.low_pass_active());
    }

    #[test]
    fn cutoff_change_keeps_spectrogram_rows() {
        let mut pipeline = FramePipeline::with_settings(settings(64, 8000.0)).unwrap();
        let tone: Vec<i8> = (0..64).map(|i| if i % 8 < 4 { 60 } else { -60 }).collect();
        pipeline.process(&tone).unwrap();
        let before = pipeline.spectrogram().unwrap().snapshot();
        pipeline.set_high_pass_cutoff(200.0).unwrap();
        assert_eq!(pipeline.spectrogram().unwrap().snapshot(), before);
        assert_eq!(pipeline.state(), PipelineState::Streaming);
    }

    #[test]
    fn failed_reconfigure_is_all_or_nothing() {
        let mut pipeline = FramePipeline::with_settings(settings(64, 8000.0)).unwrap();
        assert!(matches!(
            pipeline.set_sample_rate(150.0),
            Err(AnalyserError::InvalidFilterConfig(_))
        ));
        assert_eq!(pipeline.settings().unwrap().sample_rate, 8000.0);
        assert!(pipeline.set_frame_len(0).is_err());
        assert_eq!(pipeline.settings().unwrap().frame_len, 64);
        assert!(pipeline.set_high_pass_cutoff(5000.0).is_err());
        assert_eq!(pipeline.settings().unwrap().high_pass_cutoff_hz, 100.0);
    }

    #[test]
    fn setters_need_configuration() {
        let mut pipeline = FramePipeline::new();
        assert_eq!(pipeline.set_frame_len(256), Err(AnalyserError::NotConfigured));
        assert_eq!(pipeline.set_low_pass_cutoff(1000.0), Err(AnalyserError::NotConfigured));
    }
}
