// analyser-core/src/lib.rs

//! The core logic for the serial spectrum analyser.
//! This crate is responsible for filtering, spectral analysis, the
//! rolling spectrogram and the note tuner, plus the link to the sampling
//! board. It is completely headless and contains no plotting code.

pub mod command;
pub mod error;
pub mod fft;
pub mod filter;
pub mod link;
pub mod pipeline;
pub mod session;
pub mod spectrogram;
pub mod tuning;

pub use command::{Command, FrameLength, Led, SampleRate};
pub use error::{AnalyserError, LinkError, SessionError};
pub use fft::SpectralAnalyzer;
pub use filter::{FilterBank, FilterConfig};
pub use link::{DeviceLink, ReplayLink, SerialLink};
pub use pipeline::{FramePipeline, PipelineSettings, PipelineState, ProcessedFrame};
pub use session::{Control, FrameReport, Mode, Session, TuningReport};
pub use spectrogram::{RollDirection, SpectrogramBuffer};
pub use tuning::{NoteMatch, NoteTable, NoteTuner, TunerSettings};
