//! # Error Types
//!
//! Typed failures for the analysis pipeline, the note tuner and the
//! device link. Configuration failures never leave a component half
//! updated: every setter validates first and commits afterwards.

use thiserror::Error;

/// Failures raised by the signal-processing pipeline and the note tuner.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalyserError {
    /// Sample rate or cutoff frequencies cannot produce a valid filter.
    #[error("invalid filter configuration: {0}")]
    InvalidFilterConfig(String),

    /// A raw frame did not have the configured number of samples.
    #[error("frame length mismatch: expected {expected} samples, got {actual}")]
    FrameLengthMismatch { expected: usize, actual: usize },

    /// Pitch input to the tuner was non-positive or not finite.
    #[error("invalid frequency: {0} Hz")]
    InvalidFrequency(f32),

    /// Filtering or the FFT produced NaN or infinite values.
    #[error("numerical fault in {0}")]
    NumericalFault(&'static str),

    /// `process` was called before `configure`.
    #[error("pipeline has not been configured")]
    NotConfigured,

    /// A non-filter setting is out of range.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Failures raised by a [`DeviceLink`](crate::link::DeviceLink).
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("device i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The start-up banner was missing or malformed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The device answered a command with something other than its echo.
    #[error("command '{code}' not acknowledged, device replied {reply:?}")]
    NotAcknowledged { code: char, reply: String },

    /// Fewer bytes than a full frame arrived before the read gave up.
    #[error("short frame: expected {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },

    /// The stream ended cleanly; no more frames will arrive.
    #[error("device link closed")]
    Closed,
}

/// Anything that can stop a [`Session`](crate::session::Session) tick.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Analyser(#[from] AnalyserError),

    #[error(transparent)]
    Link(#[from] LinkError),
}

pub type Result<T, E = AnalyserError> = std::result::Result<T, E>;
