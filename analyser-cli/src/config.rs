use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use analyser_core::{PipelineSettings, TunerSettings};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub tuner: TunerSettings,
    #[serde(default)]
    pub device: DeviceConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial device used when neither --device nor --replay is given.
    pub path: Option<PathBuf>,
    pub baud: u32,
    /// Read timeout in milliseconds. A frame that stalls this long is skipped.
    pub timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: None,
            baud: 230_400,
            timeout_ms: 5000,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyser_core::RollDirection;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.pipeline, PipelineSettings::default());
        assert_eq!(config.tuner, TunerSettings::default());
        assert!(config.device.path.is_none());
        assert_eq!(config.device.baud, 230_400);
        assert_eq!(config.device.timeout_ms, 5000);
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let config: Config = toml::from_str(
            r#"
            [pipeline]
            frame_len = 512
            db_floor = 0.001
            roll = "append"

            [tuner]
            ignore_low_bins = 4

            [device]
            path = "/dev/ttyACM0"
            timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.frame_len, 512);
        assert_eq!(config.pipeline.db_floor, 0.001);
        assert_eq!(config.pipeline.roll, RollDirection::Append);
        assert_eq!(config.pipeline.spectrogram_depth, 100);
        assert_eq!(config.tuner.ignore_low_bins, 4);
        assert_eq!(config.tuner.selection_min_frequency, 100.0);
        assert_eq!(config.device.path, Some(PathBuf::from("/dev/ttyACM0")));
        assert_eq!(config.device.timeout_ms, 250);
        assert_eq!(config.device.baud, 230_400);
    }
}
