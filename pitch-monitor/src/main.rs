//! # Pitch Monitor
//!
//! Console front end for the pitch pipeline. Captures from a live input
//! device and prints per-hop pitch readings and stable-note changes.
//!
//! ## Architecture
//! - **Main thread**: parses the command line, owns the [`CaptureLoop`],
//!   prints events as they arrive
//! - **Capture thread**: started by the capture loop, runs the pipeline
//! - **Communication**: one crossbeam channel of [`PipelineEvent`]s

mod ui;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cpal::traits::{DeviceTrait, HostTrait};
use crossbeam_channel::RecvTimeoutError;
use pitch_core::{CaptureLoop, CpalInput, PipelineConfig, PipelineEvent};

use ui::event_line::{EventFormatter, OutputFormat};

/// How often the event loop wakes up to check the deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "pitch-monitor", version, about = "Real-time vocal pitch monitor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor the pitch of a live input device
    Run(RunArgs),
    /// List input devices and their default configs
    Devices,
    /// Print the effective configuration as JSON
    PrintConfig(ConfigArgs),
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// JSON config file; missing fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    sample_rate: Option<u32>,

    /// Analysis window length in samples
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Samples read per analysis step
    #[arg(long)]
    hop_size: Option<usize>,

    /// Lowest detectable frequency in Hz
    #[arg(long)]
    min_freq: Option<f32>,

    /// Highest detectable frequency in Hz
    #[arg(long)]
    max_freq: Option<f32>,

    /// RMS level below which a hop counts as silence
    #[arg(long)]
    volume_threshold: Option<f32>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Input device name (defaults to the host's default input)
    #[arg(long)]
    device: Option<String>,

    /// Print one JSON object per event
    #[arg(long)]
    json: bool,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Also print silence events
    #[arg(long)]
    show_silence: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args),
        Command::Devices => list_devices(),
        Command::PrintConfig(args) => {
            let config = args.resolve()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

impl ConfigArgs {
    /// Loads the config file if given, applies flag overrides and validates.
    fn resolve(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => PipelineConfig::default(),
        };
        self.apply(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate = sample_rate;
        }
        if let Some(buffer_size) = self.buffer_size {
            config.buffer_size = buffer_size;
        }
        if let Some(hop_size) = self.hop_size {
            config.hop_size = hop_size;
        }
        if let Some(min_freq) = self.min_freq {
            config.min_freq = min_freq;
        }
        if let Some(max_freq) = self.max_freq {
            config.max_freq = max_freq;
        }
        if let Some(volume_threshold) = self.volume_threshold {
            config.volume_threshold = volume_threshold;
        }
    }
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_config(&text).with_context(|| format!("failed to parse config file {}", path.display()))
}

fn parse_config(text: &str) -> Result<PipelineConfig> {
    Ok(serde_json::from_str(text)?)
}

fn run(args: RunArgs) -> Result<()> {
    let config = args.config.resolve()?;
    log::info!(
        "Monitoring {}-{} Hz at {} Hz, window {} hop {}",
        config.min_freq,
        config.max_freq,
        config.sample_rate,
        config.buffer_size,
        config.hop_size
    );

    let input = match &args.device {
        Some(name) => CpalInput::with_device(name.clone()),
        None => CpalInput::new(),
    };
    let (sender, receiver) = crossbeam_channel::unbounded::<PipelineEvent>();
    let mut capture = CaptureLoop::new(config, input, sender)?;
    capture.start().context("failed to start audio capture")?;

    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let formatter = EventFormatter::new(format, args.show_silence);
    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));

    let stdout = io::stdout();
    let mut out = stdout.lock();
    loop {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            log::info!("Duration elapsed");
            break;
        }
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                let Some(line) = formatter.format(&event) else {
                    continue;
                };
                if let Err(e) = writeln!(out, "{}", line) {
                    // Usually a closed pipe on the reading side.
                    log::info!("Output closed: {}", e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !capture.is_running() {
                    log::warn!("Capture thread exited unexpectedly");
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    capture.stop();
    Ok(())
}

fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|device| device.name().ok());

    let devices = host
        .input_devices()
        .context("failed to enumerate input devices")?;
    let mut found = 0;
    for device in devices {
        found += 1;
        let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
        let marker = if default_name.as_deref() == Some(name.as_str()) {
            " (default)"
        } else {
            ""
        };
        match device.default_input_config() {
            Ok(config) => println!(
                "{}{}: {} Hz, {} channel(s), {:?}",
                name,
                marker,
                config.sample_rate().0,
                config.channels(),
                config.sample_format()
            ),
            Err(e) => println!("{}{}: no default config ({})", name, marker, e),
        }
    }

    if found == 0 {
        println!("No input devices found");
    }
    Ok(())
}
