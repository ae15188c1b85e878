//! E2E tests for persistent configuration
//!
//! Tests config round-trip, defaults, backward compatibility with partial
//! files, and the settings derived for the synthesis chain.

use pingtone::config::{ConfigError, DEFAULT_LISTEN_ADDR};
use pingtone::{AppConfig, SampleWindow, Streamer};
use std::sync::Arc;

#[test]
fn test_defaults_are_valid() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
    assert_eq!(config.block_size, pingtone::DEFAULT_BLOCK_SIZE);
    assert_eq!(config.sample_rate, pingtone::DEFAULT_SAMPLE_RATE);
}

#[test]
fn test_partial_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"listen_addr": "127.0.0.1:9999", "include_tags": [4]}"#).unwrap();

    let config = AppConfig::load(&path);
    assert_eq!(config.listen_addr, "127.0.0.1:9999");
    assert_eq!(config.include_tags, vec![4]);
    assert_eq!(config.ratio_ceiling, 2.0);

    config.save(&path).unwrap();
    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains("\"ratio_ceiling\""));
    assert_eq!(AppConfig::load(&path), config);
}

#[test]
fn test_out_of_range_ceiling_rejected() {
    let config = AppConfig {
        ratio_ceiling: 3.5,
        ..Default::default()
    };
    assert_eq!(
        config.validate(),
        Err(ConfigError::InvalidRatioCeiling {
            value: 3.5,
            min: 1.0,
            max: 3.0
        })
    );
}

#[test]
fn test_config_drives_synthesis() {
    let config = AppConfig {
        include_tags: vec![1],
        sample_rate: 48000,
        ratio_ceiling: 1.5,
        ..Default::default()
    };
    config.validate().unwrap();

    let window = Arc::new(SampleWindow::zeroed(config.inclusion_filter()));
    window.record(10, 2);
    assert_eq!(window.writes(), 0);

    let streamer = Streamer::new(window, &config.synth_settings()).unwrap();
    assert_eq!(streamer.sample_rate(), 48000);
    assert_eq!(streamer.bank().law().ratio_ceiling(), 1.5);
}
