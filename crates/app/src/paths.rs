//! Output locations for CSV logs and level files.

use chrono::{DateTime, Local};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const DATA_DIR_NAME: &str = "decibel_data";

/// `<platform data dir>/decibel_data`, falling back to `./decibel_data`.
pub fn default_output_dir() -> PathBuf {
    ProjectDirs::from("com", "splmeter", "splmeter")
        .map(|dirs| dirs.data_dir().join(DATA_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME))
}

/// CSV file for a session started at `started`.
pub fn csv_path(dir: &Path, started: &DateTime<Local>) -> PathBuf {
    dir.join(format!(
        "spl-meter-output-{}.csv",
        started.format("%y%m%d_%H%M%S")
    ))
}
