//! Live measurement statistics
//!
//! Holds the window of recent latency samples written by the network
//! producer and the rank-based tiers derived from it once per audio block.

pub mod percentile;
pub mod window;
