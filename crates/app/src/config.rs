use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use splmeter_core::constants::{
    DEFAULT_MIN_INTERVAL_SECS, DEFAULT_THRESHOLD_DB, FRAME_SIZE, SAMPLE_RATE,
};
use splmeter_core::CaptureConfig;
use std::fs;
use std::path::PathBuf;

/// Persisted meter settings. Command-line flags override these per run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MeterConfig {
    #[serde(default = "default_input_device")]
    pub input_device: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    #[serde(default = "default_threshold_db")]
    pub threshold_db: f64,
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
    #[serde(default)]
    pub calibration_db: f64, // added to every reading
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_input_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    SAMPLE_RATE
}

fn default_frame_size() -> usize {
    FRAME_SIZE
}

fn default_threshold_db() -> f64 {
    DEFAULT_THRESHOLD_DB
}

fn default_min_interval_secs() -> u64 {
    DEFAULT_MIN_INTERVAL_SECS
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            input_device: default_input_device(),
            sample_rate: default_sample_rate(),
            frame_size: default_frame_size(),
            threshold_db: default_threshold_db(),
            min_interval_secs: default_min_interval_secs(),
            calibration_db: 0.0,
            output_dir: None,
        }
    }
}

impl MeterConfig {
    /// Loads configuration from disk, or returns default if not found.
    pub fn load() -> Self {
        if let Some(path) = config_path() {
            if let Ok(content) = fs::read_to_string(&path) {
                match serde_json::from_str(&content) {
                    Ok(cfg) => return cfg,
                    Err(e) => log::warn!("Ignoring invalid config {}: {}", path.display(), e),
                }
            }
        }
        Self::default()
    }

    /// Saves configuration to disk in JSON format.
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    pub fn capture(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            frame_size: self.frame_size,
        }
    }
}

fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "splmeter", "splmeter").map(|dirs| dirs.config_dir().join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = MeterConfig::default();
        assert_eq!(config.input_device, "default");
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.frame_size, 9600);
        assert_eq!(config.threshold_db, 3.0);
        assert_eq!(config.min_interval_secs, 30);
        assert_eq!(config.calibration_db, 0.0);
        assert!(config.output_dir.is_none());
    }

    #[test]
    fn test_config_deserialization_with_defaults() {
        let json = r#"{"input_device":"USB Mic","calibration_db":94.5}"#;
        let config: MeterConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.input_device, "USB Mic");
        assert_eq!(config.calibration_db, 94.5);
        assert_eq!(config.sample_rate, 48000); // Default
        assert_eq!(config.frame_size, 9600); // Default
        assert_eq!(config.min_interval_secs, 30); // Default
    }

    #[test]
    fn test_config_roundtrip() {
        let original = MeterConfig {
            input_device: "Webcam".to_string(),
            sample_rate: 44100,
            frame_size: 4410,
            threshold_db: 1.5,
            min_interval_secs: 60,
            calibration_db: -2.0,
            output_dir: Some(PathBuf::from("/tmp/spl")),
        };

        let json = serde_json::to_string(&original).unwrap();
        let restored: MeterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_capture_config_from_settings() {
        let config = MeterConfig {
            sample_rate: 44100,
            frame_size: 8192,
            ..MeterConfig::default()
        };
        let capture = config.capture();
        assert_eq!(capture.sample_rate, 44100);
        assert_eq!(capture.frame_size, 8192);
    }
}
