//! Destinations for emitted observations.
//!
//! Sinks never stop the capture loop: a failed write is reported back as a
//! [`SinkError`], logged by the loop, and the next record is attempted as usual.

use crate::error::{MeterError, SinkError};
use crate::estimator::DecibelReading;
use crate::gate::Triggers;
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CSV_HEADER: &str = "timestamp,value_db";
pub const LEVEL_FILE: &str = "single_decibel.txt";
pub const MAX_LEVEL_FILE: &str = "max_decibel.txt";

/// An accepted reading and the trigger(s) that let it through.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub reading: DecibelReading,
    pub triggers: Triggers,
}

pub trait Sink {
    fn name(&self) -> &str;

    fn record(&mut self, observation: &Observation) -> Result<(), SinkError>;

    /// Called for every transient read error with the running count.
    fn read_error(&mut self, _count: u64, _error: &MeterError) {}

    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// ISO-8601 local time with microseconds, e.g. `2024-05-01T13:45:07.123456`.
pub fn format_timestamp(timestamp: &DateTime<Local>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

pub fn format_value(value_db: f64) -> String {
    format!("{:.2}", value_db)
}

/// `timestamp,value_db` rows, flushed after every record.
pub struct CsvSink<W: Write> {
    writer: Option<W>,
}

impl CsvSink<BufWriter<File>> {
    /// Creates (or truncates) the file at `path`, creating parent directories.
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        log::info!("Writing CSV to {}", path.display());
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> CsvSink<W> {
    /// Wraps `writer` and writes the header row.
    pub fn new(mut writer: W) -> Result<Self, SinkError> {
        writeln!(writer, "{}", CSV_HEADER)?;
        writer.flush()?;
        Ok(Self {
            writer: Some(writer),
        })
    }

    pub fn into_inner(mut self) -> Option<W> {
        self.writer.take()
    }
}

impl<W: Write> Sink for CsvSink<W> {
    fn name(&self) -> &str {
        "csv"
    }

    fn record(&mut self, observation: &Observation) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        writeln!(
            writer,
            "{},{}",
            format_timestamp(&observation.reading.timestamp),
            format_value(observation.reading.value_db)
        )?;
        writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Human-readable level changes and read errors.
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Sink for ConsoleSink<W> {
    fn name(&self) -> &str {
        "console"
    }

    fn record(&mut self, observation: &Observation) -> Result<(), SinkError> {
        // Heartbeats go to the log files only
        if observation.triggers.magnitude {
            writeln!(self.out, "A-weighted: {:+.2} dB", observation.reading.value_db)?;
            self.out.flush()?;
        }
        Ok(())
    }

    fn read_error(&mut self, count: u64, error: &MeterError) {
        let written = writeln!(self.out, " ({}) Error recording: {}", count, error)
            .and_then(|_| self.out.flush());
        if let Err(e) = written {
            log::warn!("Failed to print read error {}: {}", count, e);
        }
    }
}

/// Keeps `single_decibel.txt` and `max_decibel.txt` up to date for
/// external displays that poll them.
pub struct LevelFileSink {
    level_path: PathBuf,
    max_path: PathBuf,
    max_db: Option<f64>,
}

impl LevelFileSink {
    pub fn new(dir: &Path) -> Result<Self, SinkError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            level_path: dir.join(LEVEL_FILE),
            max_path: dir.join(MAX_LEVEL_FILE),
            max_db: None,
        })
    }

    pub fn max_db(&self) -> Option<f64> {
        self.max_db
    }
}

impl Sink for LevelFileSink {
    fn name(&self) -> &str {
        "level-files"
    }

    fn record(&mut self, observation: &Observation) -> Result<(), SinkError> {
        if !observation.triggers.magnitude {
            return Ok(());
        }
        let value = observation.reading.value_db;
        fs::write(&self.level_path, format!("{:.2} dBA", value))?;

        if self.max_db.map_or(true, |max| value > max) {
            log::debug!("New maximum: {:.2} dBA", value);
            fs::write(&self.max_path, format!("MAX: {:.2} dBA", value))?;
            self.max_db = Some(value);
        }
        Ok(())
    }
}
