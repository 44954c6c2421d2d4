use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use analyser_core::Mode;

#[derive(Parser, Debug)]
#[command(name = "analyser", about = "Spectrum analyser and tuner for a serial sampling board")]
pub struct Cli {
    /// Settings file (TOML). Defaults to ./analyser.toml when present.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial device of the sampling board (e.g. /dev/ttyACM0)
    #[arg(short, long, conflicts_with = "replay")]
    pub device: Option<PathBuf>,

    /// Raw capture of signed-byte frames to play back instead of a device
    #[arg(short, long)]
    pub replay: Option<PathBuf>,

    /// Samples per frame (256, 512, 800 or 1024 on a live device)
    #[arg(long)]
    pub frame_len: Option<usize>,

    /// Sample rate in Hz (4000, 7000 or 9000 on a live device)
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// High-pass cutoff in Hz
    #[arg(long)]
    pub high_pass: Option<f32>,

    /// Low-pass cutoff in Hz. At or above Nyquist disables the stage.
    #[arg(long)]
    pub low_pass: Option<f32>,

    /// What to do with each frame
    #[arg(short, long, value_enum, default_value_t = ModeArg::Display)]
    pub mode: ModeArg,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    pub frames: Option<u64>,

    /// Print one JSON report per frame on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    Display,
    Tune,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Display => Mode::Display,
            ModeArg::Tune => Mode::Tune,
        }
    }
}
