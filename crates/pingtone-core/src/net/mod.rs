//! Network input
//!
//! Receives latency measurements as fixed 5-byte UDP records.

pub mod listener;
