//! # Device Commands
//!
//! The closed set of single-byte commands understood by the sampling
//! firmware, with the mapping in both directions.

use std::fmt;

/// Sample rates the firmware can switch between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRate {
    Hz4000,
    Hz7000,
    Hz9000,
}

impl SampleRate {
    pub const ALL: [SampleRate; 3] = [SampleRate::Hz4000, SampleRate::Hz7000, SampleRate::Hz9000];

    pub fn hz(self) -> u32 {
        match self {
            SampleRate::Hz4000 => 4000,
            SampleRate::Hz7000 => 7000,
            SampleRate::Hz9000 => 9000,
        }
    }

    pub fn from_hz(hz: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|rate| rate.hz() == hz)
    }
}

/// Frame lengths the firmware can switch between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLength {
    Samples256,
    Samples512,
    Samples800,
    Samples1024,
}

impl FrameLength {
    pub const ALL: [FrameLength; 4] = [
        FrameLength::Samples256,
        FrameLength::Samples512,
        FrameLength::Samples800,
        FrameLength::Samples1024,
    ];

    pub fn samples(self) -> usize {
        match self {
            FrameLength::Samples256 => 256,
            FrameLength::Samples512 => 512,
            FrameLength::Samples800 => 800,
            FrameLength::Samples1024 => 1024,
        }
    }

    pub fn from_samples(samples: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|len| len.samples() == samples)
    }
}

/// One of the five tuning indicators, lowest band first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
    First,
    Second,
    Third,
    Fourth,
    Fifth,
}

impl Led {
    pub const ALL: [Led; 5] = [Led::First, Led::Second, Led::Third, Led::Fourth, Led::Fifth];

    /// Indicator for a tuner band index `0..=4`.
    pub fn from_band(band: usize) -> Option<Self> {
        Self::ALL.get(band).copied()
    }

    pub fn band(self) -> usize {
        match self {
            Led::First => 0,
            Led::Second => 1,
            Led::Third => 2,
            Led::Fourth => 3,
            Led::Fifth => 4,
        }
    }
}

/// Every command the firmware acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Standby,
    SendData,
    Led(Led),
    SampleRate(SampleRate),
    FrameLength(FrameLength),
}

impl Command {
    /// The byte written to the device.
    pub fn code(self) -> u8 {
        match self {
            Command::SampleRate(SampleRate::Hz4000) => b'0',
            Command::Standby => b'1',
            Command::SendData => b'2',
            Command::Led(Led::First) => b'3',
            Command::Led(Led::Second) => b'4',
            Command::Led(Led::Third) => b'5',
            Command::Led(Led::Fourth) => b'6',
            Command::Led(Led::Fifth) => b'7',
            Command::SampleRate(SampleRate::Hz7000) => b'8',
            Command::SampleRate(SampleRate::Hz9000) => b'9',
            Command::FrameLength(FrameLength::Samples256) => b'a',
            Command::FrameLength(FrameLength::Samples512) => b'b',
            Command::FrameLength(FrameLength::Samples800) => b'c',
            Command::FrameLength(FrameLength::Samples1024) => b'd',
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        let command = match code {
            b'0' => Command::SampleRate(SampleRate::Hz4000),
            b'1' => Command::Standby,
            b'2' => Command::SendData,
            b'3' => Command::Led(Led::First),
            b'4' => Command::Led(Led::Second),
            b'5' => Command::Led(Led::Third),
            b'6' => Command::Led(Led::Fourth),
            b'7' => Command::Led(Led::Fifth),
            b'8' => Command::SampleRate(SampleRate::Hz7000),
            b'9' => Command::SampleRate(SampleRate::Hz9000),
            b'a' => Command::FrameLength(FrameLength::Samples256),
            b'b' => Command::FrameLength(FrameLength::Samples512),
            b'c' => Command::FrameLength(FrameLength::Samples800),
            b'd' => Command::FrameLength(FrameLength::Samples1024),
            _ => return None,
        };
        Some(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Standby => write!(f, "Standby"),
            Command::SendData => write!(f, "Send Data"),
            Command::Led(led) => write!(f, "LED{}", led.band() + 1),
            Command::SampleRate(rate) => write!(f, "Sample {}k", rate.hz() / 1000),
            Command::FrameLength(len) => write!(f, "Frame {}", len.samples()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_command() -> Vec<Command> {
        let mut all = vec![Command::Standby, Command::SendData];
        all.extend(Led::ALL.map(Command::Led));
        all.extend(SampleRate::ALL.map(Command::SampleRate));
        all.extend(FrameLength::ALL.map(Command::FrameLength));
        all
    }

    #[test]
    fn codes_are_unique_and_invertible() {
        let commands = every_command();
        let mut codes: Vec<u8> = commands.iter().map(|c| c.code()).collect();
        for command in &commands {
            assert_eq!(Command::from_code(command.code()), Some(*command));
        }
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), commands.len());
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert_eq!(Command::from_code(b'e'), None);
        assert_eq!(Command::from_code(b' '), None);
    }

    #[test]
    fn indicators_follow_band_order() {
        assert_eq!(Command::Led(Led::from_band(0).unwrap()).code(), b'3');
        assert_eq!(Command::Led(Led::from_band(4).unwrap()).code(), b'7');
        assert_eq!(Led::from_band(5), None);
    }

    #[test]
    fn lookups_by_value() {
        assert_eq!(SampleRate::from_hz(7000), Some(SampleRate::Hz7000));
        assert_eq!(SampleRate::from_hz(8000), None);
        assert_eq!(FrameLength::from_samples(800), Some(FrameLength::Samples800));
        assert_eq!(FrameLength::from_samples(300), None);
        assert_eq!(Command::SampleRate(SampleRate::Hz9000).to_string(), "Sample 9k");
    }
}
