//! # Spectrogram Buffer
//!
//! Fixed-depth history of dB-scaled spectrum rows. One row goes in per
//! processed frame and the oldest row falls out.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{AnalyserError, Result};

/// Where the newest row is inserted. Image orientation downstream depends on
/// this, so it is fixed for the lifetime of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollDirection {
    /// Newest row is row 0, rows shift towards the end.
    #[default]
    Prepend,
    /// Newest row is the last row, rows shift towards the start.
    Append,
}

/// Ring buffer of `[depth][row_width]` dB values.
#[derive(Debug, Clone)]
pub struct SpectrogramBuffer {
    rows: VecDeque<Vec<f32>>,
    depth: usize,
    row_width: usize,
    db_floor: f32,
    direction: RollDirection,
}

impl SpectrogramBuffer {
    /// Creates a zero-filled buffer.
    ///
    /// # Arguments
    /// * `db_floor` - Epsilon added to each magnitude before `log10`, must be > 0
    pub fn new(depth: usize, row_width: usize, db_floor: f32, direction: RollDirection) -> Result<Self> {
        if depth == 0 {
            return Err(AnalyserError::InvalidSettings(
                "spectrogram depth must be at least 1".to_string(),
            ));
        }
        if !(db_floor.is_finite() && db_floor > 0.0) {
            return Err(AnalyserError::InvalidSettings(format!(
                "dB floor epsilon must be positive, got {db_floor}"
            )));
        }
        Ok(Self {
            rows: zeroed(depth, row_width),
            depth,
            row_width,
            db_floor,
            direction,
        })
    }

    /// Reallocates to the new shape and zero-fills.
    pub fn reset(&mut self, depth: usize, row_width: usize) -> Result<()> {
        if depth == 0 {
            return Err(AnalyserError::InvalidSettings(
                "spectrogram depth must be at least 1".to_string(),
            ));
        }
        self.depth = depth;
        self.row_width = row_width;
        self.rows = zeroed(depth, row_width);
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn row_width(&self) -> usize {
        self.row_width
    }

    pub fn db_floor(&self) -> f32 {
        self.db_floor
    }

    pub fn direction(&self) -> RollDirection {
        self.direction
    }

    /// Converts `magnitudes` to `20 * log10(m + floor)` and inserts it as the
    /// newest row, evicting the oldest.
    pub fn push_row(&mut self, magnitudes: &[f32]) -> Result<()> {
        if magnitudes.len() != self.row_width {
            return Err(AnalyserError::FrameLengthMismatch {
                expected: self.row_width,
                actual: magnitudes.len(),
            });
        }
        let row: Vec<f32> = magnitudes
            .iter()
            .map(|&m| 20.0 * (m + self.db_floor).log10())
            .collect();
        if row.iter().any(|v| !v.is_finite()) {
            return Err(AnalyserError::NumericalFault("spectrogram"));
        }

        match self.direction {
            RollDirection::Prepend => {
                self.rows.pop_back();
                self.rows.push_front(row);
            }
            RollDirection::Append => {
                self.rows.pop_front();
                self.rows.push_back(row);
            }
        }
        Ok(())
    }

    /// The newest row, wherever the roll direction puts it.
    pub fn newest(&self) -> Option<&[f32]> {
        match self.direction {
            RollDirection::Prepend => self.rows.front(),
            RollDirection::Append => self.rows.back(),
        }
        .map(Vec::as_slice)
    }

    /// Copy of the grid, row 0 first.
    pub fn snapshot(&self) -> Vec<Vec<f32>> {
        self.rows.iter().cloned().collect()
    }
}

fn zeroed(depth: usize, row_width: usize) -> VecDeque<Vec<f32>> {
    (0..depth).map(|_| vec![0.0; row_width]).collect()
}
