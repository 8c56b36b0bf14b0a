use anyhow::{Context, Result};
use chrono::{Duration, Local};
use clap::{Args, Parser, Subcommand};
use log::info;
use splmeter_core::{
    a_weighting, CaptureLoop, ConsoleSink, CsvSink, EventGate, LevelEstimator, LevelFileSink,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod audio;
mod config;
mod paths;

use config::MeterConfig;

#[derive(Parser)]
#[command(name = "splmeter")]
#[command(about = "SPL meter: A-weighted sound level from the microphone", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available input devices
    List,
    /// Measure in the foreground (press Ctrl+C to stop)
    Run(RunArgs),
}

#[derive(Args, Default)]
struct RunArgs {
    /// Write accepted readings to a timestamped CSV file
    #[arg(long)]
    csv: bool,
    /// Keep single_decibel.txt / max_decibel.txt updated
    #[arg(long)]
    level_files: bool,
    /// Input device name ("default" for the system default)
    #[arg(short, long)]
    input: Option<String>,
    #[arg(long)]
    sample_rate: Option<u32>,
    /// Samples per frame
    #[arg(long)]
    frame_size: Option<usize>,
    /// Level change in dB that gets printed and logged
    #[arg(long)]
    threshold: Option<f64>,
    /// Seconds between heartbeat log records
    #[arg(long)]
    interval: Option<u64>,
    /// Offset in dB added to every reading
    #[arg(long, allow_hyphen_values = true)]
    calibration: Option<f64>,
    /// Directory for CSV and level files
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Persist the effective settings as the new defaults
    #[arg(long)]
    save_config: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut MeterConfig) {
        if let Some(input) = &self.input {
            config.input_device = input.clone();
        }
        if let Some(rate) = self.sample_rate {
            config.sample_rate = rate;
        }
        if let Some(frame_size) = self.frame_size {
            config.frame_size = frame_size;
        }
        if let Some(threshold) = self.threshold {
            config.threshold_db = threshold;
        }
        if let Some(interval) = self.interval {
            config.min_interval_secs = interval;
        }
        if let Some(calibration) = self.calibration {
            config.calibration_db = calibration;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = Some(dir.clone());
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::List) => {
            audio::list_devices()?;
        }
        Some(Commands::Run(args)) => {
            run(args)?;
        }
        None => {
            run(RunArgs::default())?;
        }
    }

    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = MeterConfig::load();
    args.apply(&mut config);
    if args.save_config {
        let path = config.save().context("Failed to save config")?;
        info!("Saved config to {}", path.display());
    }

    let capture_config = config.capture();
    capture_config.validate()?;
    let coeffs = Arc::new(
        a_weighting(config.sample_rate).context("Failed to design A-weighting filter")?,
    );

    let source = audio::CpalSource::open(&config.input_device, capture_config)
        .context("Failed to open capture device")?;
    println!("Input: {}", source.device_name());

    let estimator = LevelEstimator::new(coeffs).with_calibration(config.calibration_db);
    let gate = EventGate::new(
        config.threshold_db,
        Duration::seconds(config.min_interval_secs as i64),
    );
    let mut capture = CaptureLoop::new(source, estimator, gate);
    capture.add_sink(Box::new(ConsoleSink::stdout()));

    let output_dir = config
        .output_dir
        .clone()
        .unwrap_or_else(paths::default_output_dir);

    if args.csv {
        let path = paths::csv_path(&output_dir, &Local::now());
        let sink = CsvSink::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        println!("Logging to {}", path.display());
        capture.add_sink(Box::new(sink));
    }

    if args.level_files {
        let sink = LevelFileSink::new(&output_dir)
            .with_context(|| format!("Failed to prepare {}", output_dir.display()))?;
        capture.add_sink(Box::new(sink));
    }

    // Graceful shutdown handling
    let stop = Arc::new(AtomicBool::new(false));
    let s = stop.clone();

    ctrlc::set_handler(move || {
        println!("\nShutting down gracefully...");
        s.store(true, Ordering::Relaxed);
    })?;

    println!("Listening. Press Ctrl+C to stop.");
    let stats = capture.run(&stop).context("Capture stopped")?;

    println!(
        "SPL meter stopped. {} readings, {} logged, {} read errors.",
        stats.frames, stats.emissions, stats.read_errors
    );
    Ok(())
}
