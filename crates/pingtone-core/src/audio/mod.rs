//! Audio processing module
//!
//! This module contains all audio-related functionality including:
//! - Magnitude to phase-increment mapping ([`step`])
//! - Additive oscillator bank ([`oscillator`])
//! - Per-block callback driver ([`streamer`])
//! - WAV recording of the output ([`recorder`])
//! - Software block clock for headless runs ([`clock`])
//! - Output device management ([`engine`], `playback` feature)

pub mod clock;
#[cfg(feature = "playback")]
pub mod engine;
pub mod oscillator;
pub mod recorder;
pub mod step;
pub mod streamer;
