//! # Analyser - Serial Spectrum Analyser Front End
//!
//! Connects to the sampling board (or a replay capture), runs every frame
//! through the analysis pipeline and reports the result, optionally driving
//! the tuning indicators.

mod cli;
mod config;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use analyser_core::{
    Control, DeviceLink, FrameLength, FrameReport, LinkError, ReplayLink, SampleRate, SerialLink,
    Session, SessionError, fft,
};
use cli::Cli;
use config::{Config, DeviceConfig};

const DEFAULT_CONFIG: &str = "analyser.toml";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(|| {
        let local = PathBuf::from(DEFAULT_CONFIG);
        local.exists().then_some(local)
    });
    let mut config = match config_path {
        Some(ref path) => {
            let cfg = config::load_config(path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };

    // Command-line values win over the file.
    if let Some(frame_len) = cli.frame_len {
        config.pipeline.frame_len = frame_len;
    }
    if let Some(rate) = cli.sample_rate {
        config.pipeline.sample_rate = rate as f32;
    }
    if let Some(hz) = cli.high_pass {
        config.pipeline.high_pass_cutoff_hz = hz;
    }
    if let Some(hz) = cli.low_pass {
        config.pipeline.low_pass_cutoff_hz = hz;
    }

    if let Some(ref path) = cli.replay {
        let file = File::open(path)
            .with_context(|| format!("Failed to open capture: {}", path.display()))?;
        log::info!("Replaying {}", path.display());
        let link = ReplayLink::new(
            BufReader::new(file),
            config.pipeline.frame_len,
            config.pipeline.sample_rate as u32,
        );
        return run(link, &config, &cli, Vec::new());
    }

    let Some(device) = cli.device.clone().or_else(|| config.device.path.clone()) else {
        bail!("Either --device or --replay is required");
    };
    let port = open_port(&device, &config.device)?;
    let reader = BufReader::new(port.try_clone().context("Failed to clone device handle")?);
    let link = SerialLink::connect(reader, port).context("Device handshake failed")?;

    // A live board only switches between its fixed formats.
    let mut format = Vec::new();
    if let Some(len) = cli.frame_len {
        let len = FrameLength::from_samples(len)
            .with_context(|| format!("Frame length must be 256, 512, 800 or 1024, got {len}"))?;
        format.push(Control::SetFrameLength(len));
    }
    if let Some(hz) = cli.sample_rate {
        let rate = SampleRate::from_hz(hz)
            .with_context(|| format!("Sample rate must be 4000, 7000 or 9000 Hz, got {hz}"))?;
        format.push(Control::SetSampleRate(rate));
    }
    run(link, &config, &cli, format)
}

/// Opens the board's port in raw 8N1 mode with a read timeout.
fn open_port(path: &Path, device: &DeviceConfig) -> Result<Box<dyn SerialPort>> {
    let port = serialport::new(path.to_string_lossy(), device.baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_millis(device.timeout_ms))
        .open()
        .with_context(|| format!("Failed to open device: {}", path.display()))?;
    log::info!("Opened {} at {} baud", path.display(), device.baud);
    Ok(port)
}

fn run<L: DeviceLink>(link: L, config: &Config, cli: &Cli, format: Vec<Control>) -> Result<()> {
    let (mut session, controls) = Session::new(link, config.pipeline, config.tuner)
        .context("Failed to configure pipeline")?;

    for control in format {
        controls.send(control)?;
    }
    controls.send(Control::SetMode(cli.mode.into()))?;
    session.start().context("Failed to start streaming")?;

    let mut stdout = std::io::stdout().lock();
    let mut processed = 0u64;
    while cli.frames.is_none_or(|limit| processed < limit) {
        match session.tick() {
            Ok(Some(report)) => {
                processed += 1;
                if cli.json {
                    serde_json::to_writer(&mut stdout, &report)?;
                    writeln!(stdout)?;
                } else {
                    log_summary(&session, &report);
                }
            }
            Ok(None) => continue,
            Err(SessionError::Link(LinkError::Closed)) => {
                log::info!("Link closed");
                break;
            }
            Err(e) => return Err(e).context("Frame processing failed"),
        }
    }

    log::info!("Processed {} frames", processed);
    if let Err(e) = session.apply(Control::Standby) {
        log::warn!("Failed to put device in standby: {}", e);
    }
    Ok(())
}

fn log_summary<L: DeviceLink>(session: &Session<L>, report: &FrameReport) {
    match &report.tuning {
        Some(tuning) => log::info!(
            "[{}] peak {:.1} Hz, note {} ({:+.0} cents){}",
            report.sequence,
            tuning.peak_hz,
            tuning.note,
            tuning.cents,
            tuning
                .indicator
                .map(|band| format!(", indicator -> {band}"))
                .unwrap_or_default()
        ),
        None => {
            let ignore = session.tuner().settings().ignore_low_bins;
            let peak = fft::peak_bin(&report.spectrum, ignore)
                .and_then(|bin| session.pipeline().frequency_axis().get(bin).copied());
            match peak {
                Some(hz) => log::info!("[{}] spectrum peak {:.1} Hz", report.sequence, hz),
                None => log::info!("[{}] no spectrum peak", report.sequence),
            }
        }
    }
}
