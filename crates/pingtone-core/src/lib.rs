//! Pingtone Core - Real-time latency sonification engine
//!
//! Turns a live stream of latency measurements into a continuously updated
//! tone. Measurements arrive over UDP into a lock-free [`SampleWindow`]; once
//! per audio block the [`Streamer`] extracts percentile tiers from the window
//! and drives an additive [`OscillatorBank`] whose partials follow the shape
//! of the latency distribution.

pub mod audio;
pub mod config;
pub mod net;
pub mod shutdown;
pub mod stats;

pub use audio::{
    clock::ClockedHost,
    oscillator::{AmplitudeLaw, OscillatorBank},
    recorder::{Recorder, RecorderHandle, WavSink},
    step::StepMapper,
    streamer::{BlockReport, Streamer, SynthSettings},
};
#[cfg(feature = "playback")]
pub use audio::engine::{EngineState, PlaybackEngine};
pub use config::{AppConfig, ConfigError};
pub use net::listener::{decode_record, UdpListener, WireRecord};
pub use shutdown::{Shutdown, ShutdownListener};
pub use stats::{
    percentile::{PercentileExtractor, PercentileTiers},
    window::{InclusionFilter, SampleWindow},
};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Default output sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default block size in frames (100 blocks per second at 44.1kHz)
pub const DEFAULT_BLOCK_SIZE: usize = 441;

/// Number of raw measurements kept in the live window
pub const WINDOW_SIZE: usize = 256;

/// Number of percentile tiers, one oscillator each
pub const TIER_COUNT: usize = 8;
