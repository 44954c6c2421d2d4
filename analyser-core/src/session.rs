//! # Session Loop
//!
//! Drives one device link through one pipeline and one tuner on a single
//! thread. Reconfiguration requests from other threads arrive through a
//! control queue and are applied between frames, never during one.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use serde::Serialize;

use crate::command::{Command, FrameLength, Led, SampleRate};
use crate::error::{AnalyserError, LinkError, SessionError};
use crate::link::DeviceLink;
use crate::pipeline::{FramePipeline, PipelineSettings, ProcessedFrame};
use crate::tuning::{self, NoteTuner, TunerSettings};

/// What the session does with each frame beyond producing plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Plots only.
    #[default]
    Display,
    /// Track the peak and drive the indicators.
    Tune,
}

/// Requests queued for the session thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    SetMode(Mode),
    SetSampleRate(SampleRate),
    SetFrameLength(FrameLength),
    SetHighPassCutoff(f32),
    SetLowPassCutoff(f32),
    Standby,
}

/// Tuner outcome for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuningReport {
    /// Frequency of the strongest bin above the ignored low bins, in Hz.
    pub peak_hz: f32,
    pub note: String,
    pub note_hz: f32,
    pub cents: f32,
    /// Band index sent to the device this frame, if the selection changed.
    pub indicator: Option<usize>,
}

/// Everything a renderer needs from one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub sequence: u64,
    pub sample_rate: f32,
    pub low_pass_active: bool,
    pub waveform: Vec<f32>,
    pub spectrum: Vec<f32>,
    pub tuning: Option<TuningReport>,
}

/// One link, one pipeline, one tuner.
pub struct Session<L> {
    link: L,
    pipeline: FramePipeline,
    tuner: NoteTuner,
    mode: Mode,
    controls: Receiver<Control>,
    sequence: u64,
}

impl<L: DeviceLink> Session<L> {
    /// Builds a session whose frame length and sample rate follow the link.
    ///
    /// # Returns
    /// * The session and the sending half of its control queue
    pub fn new(
        link: L,
        pipeline_settings: PipelineSettings,
        tuner_settings: TunerSettings,
    ) -> Result<(Self, Sender<Control>), SessionError> {
        let settings = PipelineSettings {
            frame_len: link.frame_len(),
            sample_rate: link.sample_rate() as f32,
            ..pipeline_settings
        };
        let pipeline = FramePipeline::with_settings(settings)?;
        let (sender, controls) = crossbeam_channel::unbounded();

        let session = Self {
            link,
            pipeline,
            tuner: NoteTuner::new(tuner_settings),
            mode: Mode::default(),
            controls,
            sequence: 0,
        };
        Ok((session, sender))
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }

    pub fn tuner(&self) -> &NoteTuner {
        &self.tuner
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Asks the device to start streaming.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.link.send_command(Command::SendData)?;
        Ok(())
    }

    /// Applies one control. Format changes are checked against the pipeline
    /// first, then sent to the device, and only take effect once the device
    /// acknowledges them. On any failure both sides keep the old format.
    pub fn apply(&mut self, control: Control) -> Result<(), SessionError> {
        log::debug!("Applying {:?}", control);
        match control {
            Control::SetMode(mode) => {
                if mode != self.mode {
                    self.tuner.reset();
                }
                self.mode = mode;
                log::info!("Mode set to {:?}", mode);
            }
            Control::SetSampleRate(rate) => {
                let next = self.next_settings(|s| s.sample_rate = rate.hz() as f32)?;
                self.link.send_command(Command::SampleRate(rate))?;
                self.pipeline.configure(next)?;
            }
            Control::SetFrameLength(len) => {
                let next = self.next_settings(|s| s.frame_len = len.samples())?;
                self.link.send_command(Command::FrameLength(len))?;
                self.pipeline.configure(next)?;
            }
            Control::SetHighPassCutoff(hz) => self.pipeline.set_high_pass_cutoff(hz)?,
            Control::SetLowPassCutoff(hz) => self.pipeline.set_low_pass_cutoff(hz)?,
            Control::Standby => self.link.send_command(Command::Standby)?,
        }
        Ok(())
    }

    fn next_settings(
        &self,
        change: impl FnOnce(&mut PipelineSettings),
    ) -> Result<PipelineSettings, SessionError> {
        let mut settings = self.pipeline.settings().ok_or(AnalyserError::NotConfigured)?;
        change(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    fn drain_controls(&mut self) -> Result<(), SessionError> {
        loop {
            match self.controls.try_recv() {
                Ok(control) => self.apply(control)?,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }

    /// Applies queued controls, then reads and processes one frame.
    ///
    /// # Returns
    /// * `Ok(Some(report))` - a frame was processed
    /// * `Ok(None)` - the frame arrived incomplete and was skipped
    pub fn tick(&mut self) -> Result<Option<FrameReport>, SessionError> {
        self.drain_controls()?;

        let raw = match self.link.read_frame() {
            Ok(raw) => raw,
            Err(LinkError::ShortFrame { expected, actual }) => {
                log::warn!("Skipping short frame ({actual} of {expected} bytes)");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let ProcessedFrame { spectrum, waveform } = self.pipeline.process(&raw)?;
        let tuning = match self.mode {
            Mode::Tune => self.tune(&spectrum)?,
            Mode::Display => None,
        };

        self.sequence += 1;
        Ok(Some(FrameReport {
            sequence: self.sequence,
            sample_rate: self.pipeline.settings().map_or(0.0, |s| s.sample_rate),
            low_pass_active: self.pipeline.low_pass_active(),
            waveform,
            spectrum,
            tuning,
        }))
    }

    fn tune(&mut self, spectrum: &[f32]) -> Result<Option<TuningReport>, SessionError> {
        let Some(peak_hz) = self.tuner.peak_frequency(spectrum, self.pipeline.frequency_axis()) else {
            return Ok(None);
        };
        if peak_hz <= 0.0 {
            return Ok(None);
        }

        let note = self.tuner.nearest_note(peak_hz)?;
        let indicator = self.tuner.select(peak_hz)?;
        if let Some(band) = indicator {
            log::info!("Actual peak: {:.1} Hz, closest note: {} ({:.2} Hz)", peak_hz, note.name, note.frequency);
            if let Some(led) = Led::from_band(band) {
                self.link.send_command(Command::Led(led))?;
            }
        }

        Ok(Some(TuningReport {
            peak_hz,
            cents: tuning::cents_deviation(peak_hz, note.frequency),
            note: note.name,
            note_hz: note.frequency,
            indicator,
        }))
    }
}
