//! Pingtone - latency sonification
//!
//! This library re-exports the synthesis engine, UDP listener and recorder
//! from `pingtone-core`. The binary in `main.rs` wires them together.

pub use pingtone_core::audio;
pub use pingtone_core::config;
pub use pingtone_core::net;
pub use pingtone_core::stats;

pub use pingtone_core::{
    decode_record, AppConfig, ClockedHost, InclusionFilter, OscillatorBank, PercentileExtractor,
    PercentileTiers, Recorder, SampleWindow, Shutdown, StepMapper, Streamer, SynthSettings,
    UdpListener, WireRecord,
};
pub use pingtone_core::{BUILD_DATE, DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE, VERSION};
