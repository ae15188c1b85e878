//! Application configuration
//!
//! Stored as JSON at `<config_dir>/pingtone/config.json`. Every field has a
//! default, so a partial (or missing) file is valid. Command-line flags are
//! applied on top by the binary, then [`AppConfig::validate`] runs once
//! before anything is started.

use crate::audio::oscillator::{DEFAULT_RATIO_CEILING, MAX_RATIO_CEILING, MIN_RATIO_CEILING};
use crate::audio::streamer::{SynthSettings, DEFAULT_GAIN};
use crate::stats::window::InclusionFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default UDP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:12345";

/// Default interval between logged tone reports in seconds
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 10;

/// Largest block the device or clock may request
pub const MAX_BLOCK_SIZE: usize = 8192;

/// Longest accepted interval between tone reports (one day)
pub const MAX_REPORT_INTERVAL_SECS: u64 = 86_400;

/// Configuration validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid listen address '{0}' (expected host:port)")]
    InvalidListenAddr(String),

    #[error("Sample rate must be within 8000..=384000 Hz, got {0}")]
    InvalidSampleRate(u32),

    #[error("Block size must be within 1..={max}, got {value}")]
    InvalidBlockSize { value: usize, max: usize },

    #[error("Ratio ceiling must be within [{min}, {max}], got {value}")]
    InvalidRatioCeiling { value: f64, min: f64, max: f64 },

    #[error("Gain must be within [0, 1], got {0}")]
    InvalidGain(f32),

    #[error("Report interval must be within 1..={max} seconds, got {value}")]
    InvalidReportInterval { value: u64, max: u64 },
}

/// Whether `addr` has the `host:port` shape the listener can bind
///
/// The host may be an IP literal, a name resolved at bind time, or empty
/// (all interfaces). Names are not resolved here.
fn is_listen_addr(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            port.parse::<u16>().is_ok() && !host.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_sample_rate() -> u32 {
    crate::DEFAULT_SAMPLE_RATE
}

fn default_block_size() -> usize {
    crate::DEFAULT_BLOCK_SIZE
}

fn default_ratio_ceiling() -> f64 {
    DEFAULT_RATIO_CEILING
}

fn default_gain() -> f32 {
    DEFAULT_GAIN
}

fn default_report_interval_secs() -> u64 {
    DEFAULT_REPORT_INTERVAL_SECS
}

/// Persistent application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// UDP address to receive measurements on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Accepted record tags (empty = accept all)
    #[serde(default)]
    pub include_tags: Vec<u8>,
    /// Output device name (None = system default)
    #[serde(default)]
    pub device: Option<String>,
    /// Output sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Frames per audio block
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Upper bound on the ratio between adjacent tiers
    #[serde(default = "default_ratio_ceiling")]
    pub ratio_ceiling: f64,
    /// Master output gain
    #[serde(default = "default_gain")]
    pub gain: f32,
    /// WAV file to record to (None = no recording)
    #[serde(default)]
    pub record: Option<PathBuf>,
    /// Seconds between logged tone reports
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            include_tags: Vec::new(),
            device: None,
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            ratio_ceiling: default_ratio_ceiling(),
            gain: default_gain(),
            record: None,
            report_interval_secs: default_report_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Config file path: `<config_dir>/pingtone/config.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pingtone")
            .join("config.json")
    }

    /// Load config from disk, falling back to defaults on any error
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to parse config, using defaults"
                    );
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }

    /// Check every field; the first invalid one is reported
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_listen_addr(&self.listen_addr) {
            return Err(ConfigError::InvalidListenAddr(self.listen_addr.clone()));
        }
        if !(8000..=384000).contains(&self.sample_rate) {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if !(1..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(ConfigError::InvalidBlockSize {
                value: self.block_size,
                max: MAX_BLOCK_SIZE,
            });
        }
        if !(MIN_RATIO_CEILING..=MAX_RATIO_CEILING).contains(&self.ratio_ceiling) {
            return Err(ConfigError::InvalidRatioCeiling {
                value: self.ratio_ceiling,
                min: MIN_RATIO_CEILING,
                max: MAX_RATIO_CEILING,
            });
        }
        if !(0.0..=1.0).contains(&self.gain) {
            return Err(ConfigError::InvalidGain(self.gain));
        }
        if !(1..=MAX_REPORT_INTERVAL_SECS).contains(&self.report_interval_secs) {
            return Err(ConfigError::InvalidReportInterval {
                value: self.report_interval_secs,
                max: MAX_REPORT_INTERVAL_SECS,
            });
        }
        Ok(())
    }

    /// Synthesis parameters for the [`Streamer`](crate::Streamer)
    pub fn synth_settings(&self) -> SynthSettings {
        SynthSettings {
            sample_rate: self.sample_rate,
            ratio_ceiling: self.ratio_ceiling,
            gain: self.gain,
        }
    }

    /// Inclusion filter built from `include_tags`
    pub fn inclusion_filter(&self) -> InclusionFilter {
        InclusionFilter::new(self.include_tags.iter().copied())
    }

    /// Samples between tone reports
    pub fn report_interval_samples(&self) -> u64 {
        self.report_interval_secs
            .max(1)
            .saturating_mul(self.sample_rate as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:12345");
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.block_size, 441);
        assert_eq!(config.ratio_ceiling, 2.0);
        assert_eq!(config.gain, 0.125);
        assert!(config.include_tags.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let json = r#"{"include_tags": [1, 4], "block_size": 1024}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.include_tags, vec![1, 4]);
        assert_eq!(config.block_size, 1024);
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_validation_errors() {
        let bad_addr = AppConfig {
            listen_addr: "12345".into(),
            ..Default::default()
        };
        assert!(matches!(bad_addr.validate(), Err(ConfigError::InvalidListenAddr(_))));

        let bad_ceiling = AppConfig {
            ratio_ceiling: 0.9,
            ..Default::default()
        };
        assert!(matches!(
            bad_ceiling.validate(),
            Err(ConfigError::InvalidRatioCeiling { .. })
        ));

        let bad_block = AppConfig {
            block_size: 0,
            ..Default::default()
        };
        assert!(matches!(bad_block.validate(), Err(ConfigError::InvalidBlockSize { .. })));

        let bad_gain = AppConfig {
            gain: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(bad_gain.validate(), Err(ConfigError::InvalidGain(_))));
    }

    #[test]
    fn test_listen_addr_forms() {
        for addr in ["localhost:9000", ":12345", "0.0.0.0:0", "[::1]:12345", "host.lan:1"] {
            let config = AppConfig {
                listen_addr: addr.into(),
                ..Default::default()
            };
            assert!(config.validate().is_ok(), "{} should be accepted", addr);
        }
        for addr in ["", "localhost", "localhost:", "localhost:70000", "bad host:1"] {
            let config = AppConfig {
                listen_addr: addr.into(),
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidListenAddr(_))),
                "{} should be rejected",
                addr
            );
        }
    }

    #[test]
    fn test_report_interval_bounded() {
        let huge = AppConfig {
            report_interval_secs: u64::MAX / 2,
            ..Default::default()
        };
        assert!(matches!(
            huge.validate(),
            Err(ConfigError::InvalidReportInterval { .. })
        ));
        // Unvalidated configs still never overflow
        assert_eq!(huge.report_interval_samples(), u64::MAX);

        let zero = AppConfig {
            report_interval_secs: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
        assert_eq!(zero.report_interval_samples(), 44100);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = AppConfig {
            include_tags: vec![3],
            record: Some(PathBuf::from("out.wav")),
            ratio_ceiling: 1.125,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path), config);
    }

    #[test]
    fn test_load_falls_back_on_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(AppConfig::load(&path), AppConfig::default());
        assert_eq!(AppConfig::load(&dir.path().join("absent.json")), AppConfig::default());
    }

    #[test]
    fn test_derived_settings() {
        let config = AppConfig {
            include_tags: vec![9, 2, 9],
            report_interval_secs: 2,
            ..Default::default()
        };
        assert_eq!(config.inclusion_filter().tags(), &[2, 9]);
        assert_eq!(config.report_interval_samples(), 88200);
        assert_eq!(config.synth_settings().gain, config.gain);
    }
}
