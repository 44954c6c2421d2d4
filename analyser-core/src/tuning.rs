//! # Musical Tuning Module
//!
//! Maps a detected peak frequency onto a one-octave reference scale and then
//! onto one of five indicator bands around the matched note.
//!
//! ## Features
//! - One-octave note table anchored at A4 = 440 Hz
//! - Octave folding of the table to the target, as a pure function
//! - Five-way band split between a note and its neighbours
//! - Selection hysteresis so an unchanged pitch sends no new command
//! - Cent deviation for reporting

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{AnalyserError, Result};
use crate::fft;

/// Number of indicator bands between two neighbouring notes.
pub const BAND_COUNT: usize = 5;

/// Band index meaning "on the note".
pub const ON_NOTE_BAND: usize = 2;

/// Represents a single reference note with its label and frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Label (e.g., "A", "C", "A+")
    pub name: String,
    /// Frequency in Hz
    pub frequency: f32,
}

/// One octave of the natural scale from A4 up to A5.
static DEFAULT_TABLE: Lazy<NoteTable> = Lazy::new(|| {
    const NOTES: [(&str, f32); 8] = [
        ("A", 440.0),
        ("B", 493.88),
        ("C", 523.25),
        ("D", 587.33),
        ("E", 659.25),
        ("F", 698.46),
        ("G", 783.99),
        ("A+", 880.0),
    ];
    NoteTable {
        notes: NOTES
            .iter()
            .map(|&(name, frequency)| Note {
                name: name.to_string(),
                frequency,
            })
            .collect(),
    }
});

/// Strictly increasing reference frequencies spanning at most one octave.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteTable {
    notes: Vec<Note>,
}

impl Default for NoteTable {
    fn default() -> Self {
        DEFAULT_TABLE.clone()
    }
}

impl NoteTable {
    /// Builds a table from ascending notes.
    ///
    /// # Errors
    /// * `InvalidSettings` if the table is empty, not strictly increasing,
    ///   contains non-positive values, or spans more than an octave
    pub fn new(notes: Vec<Note>) -> Result<Self> {
        let Some(first) = notes.first() else {
            return Err(AnalyserError::InvalidSettings("note table is empty".to_string()));
        };
        if !(first.frequency.is_finite() && first.frequency > 0.0) {
            return Err(AnalyserError::InvalidSettings(format!(
                "note {} has non-positive frequency {}",
                first.name, first.frequency
            )));
        }
        if notes.windows(2).any(|pair| !(pair[1].frequency > pair[0].frequency)) {
            return Err(AnalyserError::InvalidSettings(
                "note table must be strictly increasing".to_string(),
            ));
        }
        let table = Self { notes };
        if !(table.max() <= 2.0 * table.min()) {
            return Err(AnalyserError::InvalidSettings(format!(
                "note table spans {}..{} Hz, more than one octave",
                table.min(),
                table.max()
            )));
        }
        Ok(table)
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn min(&self) -> f32 {
        self.notes[0].frequency
    }

    pub fn max(&self) -> f32 {
        self.notes[self.notes.len() - 1].frequency
    }

    fn scaled(&self, factor: f32) -> Self {
        Self {
            notes: self
                .notes
                .iter()
                .map(|note| Note {
                    name: note.name.clone(),
                    frequency: note.frequency * factor,
                })
                .collect(),
        }
    }

    /// Returns a copy of the table shifted by whole octaves until `target`
    /// lies within `[min, max]`. The table itself is left untouched.
    ///
    /// For a table narrower than an octave a target can fall in the gap
    /// between two foldings; the copy then ends just below the target.
    ///
    /// Targets too small or too large to fold into a finite, non-zero
    /// table are rejected with `InvalidFrequency`.
    pub fn aligned_to(&self, target: f32) -> Result<Self> {
        if !(target.is_finite() && target >= f32::MIN_POSITIVE) {
            return Err(AnalyserError::InvalidFrequency(target));
        }
        let mut factor = 1.0f32;
        while target > self.max() * factor {
            factor *= 2.0;
        }
        while target < self.min() * factor {
            factor /= 2.0;
        }
        let aligned = self.scaled(factor);
        if !(aligned.max().is_finite() && aligned.min() >= f32::MIN_POSITIVE) {
            return Err(AnalyserError::InvalidFrequency(target));
        }
        Ok(aligned)
    }

    /// Index of the entry closest to `freq`, first one on ties.
    fn closest(&self, freq: f32) -> usize {
        let mut best = 0;
        for (i, note) in self.notes.iter().enumerate() {
            if (note.frequency - freq).abs() < (self.notes[best].frequency - freq).abs() {
                best = i;
            }
        }
        best
    }
}

/// The reference note nearest to a detected frequency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteMatch {
    /// Position in the reference table.
    pub index: usize,
    /// Label of the reference note.
    pub name: String,
    /// Reference frequency after octave folding, in Hz.
    pub frequency: f32,
}

/// Tuner knobs exposed through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerSettings {
    /// Spectrum bins at the bottom that are never taken as the peak.
    pub ignore_low_bins: usize,
    /// Peaks below this frequency never change the selection.
    pub selection_min_frequency: f32,
}

impl Default for TunerSettings {
    fn default() -> Self {
        Self {
            ignore_low_bins: 10,
            selection_min_frequency: 100.0,
        }
    }
}

/// Turns peak frequencies into indicator selections.
#[derive(Debug, Clone)]
pub struct NoteTuner {
    reference: NoteTable,
    settings: TunerSettings,
    selected: Option<usize>,
}

impl NoteTuner {
    pub fn new(settings: TunerSettings) -> Self {
        Self::with_table(NoteTable::default(), settings)
    }

    pub fn with_table(reference: NoteTable, settings: TunerSettings) -> Self {
        Self {
            reference,
            settings,
            selected: None,
        }
    }

    pub fn settings(&self) -> TunerSettings {
        self.settings
    }

    pub fn reference(&self) -> &NoteTable {
        &self.reference
    }

    /// Currently lit indicator, if any.
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Forgets the current selection so the next pitch is always reported.
    pub fn reset(&mut self) {
        self.selected = None;
    }

    /// The reference table folded so that `target` is in range.
    pub fn align_reference(&self, target: f32) -> Result<NoteTable> {
        self.reference.aligned_to(target)
    }

    /// Finds the reference note closest to `freq`.
    pub fn nearest_note(&self, freq: f32) -> Result<NoteMatch> {
        let aligned = self.align_reference(freq)?;
        let index = aligned.closest(freq);
        let note = &aligned.notes[index];
        Ok(NoteMatch {
            index,
            name: note.name.clone(),
            frequency: note.frequency,
        })
    }

    /// Which of the five bands around the nearest note `freq` falls in.
    ///
    /// Band 2 is the note itself, bands 0 and 4 are the midpoints towards
    /// the lower and upper neighbours, bands 1 and 3 sit halfway between.
    pub fn band_index(&self, freq: f32) -> Result<usize> {
        let aligned = self.align_reference(freq)?;
        let notes = &aligned.notes;
        let last = notes.len() - 1;
        let index = aligned.closest(freq);
        let note = notes[index].frequency;

        let lower = if index == 0 {
            notes[last].frequency / 2.0
        } else {
            notes[index - 1].frequency
        };
        let upper = if index == last {
            notes[0].frequency * 2.0
        } else {
            notes[index + 1].frequency
        };

        let mut bands = [0.0f32; BAND_COUNT];
        bands[ON_NOTE_BAND] = note;
        bands[0] = (note + lower) / 2.0;
        bands[4] = (note + upper) / 2.0;
        bands[1] = (bands[0] + note) / 2.0;
        bands[3] = (bands[4] + note) / 2.0;

        // Bands collapse onto the note at the octave seam; ties go to the
        // band nearest the note.
        let best = (0..BAND_COUNT)
            .min_by(|&a, &b| {
                let da = (bands[a] - freq).abs();
                let db = (bands[b] - freq).abs();
                da.partial_cmp(&db)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.abs_diff(ON_NOTE_BAND).cmp(&b.abs_diff(ON_NOTE_BAND)))
            })
            .unwrap_or(ON_NOTE_BAND);
        Ok(best)
    }

    /// Band index for `freq` if it differs from the current selection.
    ///
    /// # Returns
    /// * `Ok(Some(band))` - the selection changed to `band`
    /// * `Ok(None)` - below the selection floor, or unchanged
    pub fn select(&mut self, freq: f32) -> Result<Option<usize>> {
        if !(freq.is_finite() && freq > 0.0) {
            return Err(AnalyserError::InvalidFrequency(freq));
        }
        if freq < self.settings.selection_min_frequency {
            return Ok(None);
        }

        let band = self.band_index(freq)?;
        if self.selected == Some(band) {
            return Ok(None);
        }
        log::debug!("Indicator {:?} -> {} for peak {:.1} Hz", self.selected, band, freq);
        self.selected = Some(band);
        Ok(Some(band))
    }

    /// Frequency of the strongest bin above the ignored low bins.
    pub fn peak_frequency(&self, spectrum: &[f32], frequency_axis: &[f32]) -> Option<f32> {
        fft::peak_bin(spectrum, self.settings.ignore_low_bins)
            .and_then(|bin| frequency_axis.get(bin).copied())
    }
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat.
pub fn cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}
