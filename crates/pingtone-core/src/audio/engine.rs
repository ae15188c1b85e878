//! Output device engine
//!
//! Opens an output stream on a cpal device and drives a [`Streamer`] from the
//! device callback. The streamer renders mono; the callback copies each
//! sample to every channel of the frame.
//!
//! Only compiled with the `playback` feature.

use crate::audio::streamer::{Streamer, StreamerCounters};
use crate::config::MAX_BLOCK_SIZE;
use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during audio engine operations
#[derive(Error, Debug)]
pub enum AudioEngineError {
    #[error("No output device available")]
    NoDevicesFound,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("No output channels available")]
    NoOutputChannels,
}

/// Output device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device name
    pub name: String,
    /// Whether this is the default output device
    pub is_default: bool,
    /// Supported sample rates
    pub sample_rates: Vec<u32>,
    /// Number of output channels
    pub output_channels: u16,
}

/// Audio engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Engine is stopped
    Stopped,
    /// Engine is running and pulling blocks from the streamer
    Running,
    /// The stream reported an error
    Error,
}

/// Pick the buffer size for the real stream
///
/// Opens a trial stream with a fixed `block_size` buffer through `open` and
/// closes it again before returning, so the device is free for the real
/// stream. Falls back to the host default if the fixed size is refused.
fn choose_buffer_size<S, E: std::fmt::Display>(
    block_size: usize,
    open: impl FnOnce(cpal::BufferSize) -> Result<S, E>,
) -> cpal::BufferSize {
    let fixed = cpal::BufferSize::Fixed(block_size as u32);
    match open(fixed.clone()) {
        Ok(trial) => {
            drop(trial);
            fixed
        }
        Err(e) => {
            tracing::warn!(
                block_size,
                error = %e,
                "Fixed buffer size rejected, using device default"
            );
            cpal::BufferSize::Default
        }
    }
}

/// Plays a [`Streamer`] through an output device
pub struct PlaybackEngine {
    state: EngineState,
    block_size: usize,
    device_name: Option<String>,
    device: Option<Device>,
    stream: Option<Stream>,
    running: Option<Arc<AtomicBool>>,
    stream_errors: Arc<AtomicU64>,
    counters: Option<Arc<StreamerCounters>>,
}

impl PlaybackEngine {
    /// Create an engine requesting `block_size` frames per callback
    pub fn new(block_size: usize) -> Self {
        Self {
            state: EngineState::Stopped,
            block_size: block_size.clamp(1, MAX_BLOCK_SIZE),
            device_name: None,
            device: None,
            stream: None,
            running: None,
            stream_errors: Arc::new(AtomicU64::new(0)),
            counters: None,
        }
    }

    /// Get current engine state
    pub fn state(&self) -> EngineState {
        if self.state == EngineState::Running && self.stream_errors.load(Ordering::Relaxed) > 0 {
            return EngineState::Error;
        }
        self.state
    }

    /// Requested frames per callback
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// List available output devices
    ///
    /// # Returns
    /// Vector of device information for every device with output channels
    pub fn list_devices() -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let default_output = host.default_output_device().and_then(|d| d.name().ok());
        let mut devices = Vec::new();

        for device in host.output_devices()? {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let is_default = default_output.as_deref() == Some(name.as_str());

            let output_channels = device
                .default_output_config()
                .map(|c| c.channels())
                .unwrap_or(0);

            let common_rates = [22050, 44100, 48000, 88200, 96000, 192000];
            let mut sample_rates = Vec::new();
            if let Ok(configs) = device.supported_output_configs() {
                for config in configs {
                    for &rate in &common_rates {
                        if (config.min_sample_rate().0..=config.max_sample_rate().0).contains(&rate)
                            && !sample_rates.contains(&rate)
                        {
                            sample_rates.push(rate);
                        }
                    }
                }
            }
            sample_rates.sort();

            devices.push(DeviceInfo {
                name,
                is_default,
                sample_rates,
                output_channels,
            });
        }

        Ok(devices)
    }

    /// Select an output device by name
    ///
    /// # Arguments
    /// * `name` - Device name as reported by [`PlaybackEngine::list_devices`]
    pub fn select_device(&mut self, name: &str) -> Result<()> {
        let host = cpal::default_host();
        let device = host
            .output_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioEngineError::DeviceNotFound(name.to_string()))?;

        self.device = Some(device);
        self.device_name = Some(name.to_string());
        Ok(())
    }

    /// Select the system default output device
    pub fn select_default_device(&mut self) -> Result<()> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(AudioEngineError::NoDevicesFound)?;
        self.device_name = Some(device.name().unwrap_or_else(|_| "default".to_string()));
        self.device = Some(device);
        Ok(())
    }

    /// Get the selected device name
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// Pick the sample rate to synthesize at
    ///
    /// Returns `requested` when the device supports it, otherwise the device
    /// default. Call before building the [`Streamer`] so its step mapping
    /// matches the stream.
    pub fn negotiate_rate(&self, requested: u32) -> Result<u32> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| anyhow!("No device selected"))?;

        let supported = device
            .supported_output_configs()
            .map(|configs| {
                configs
                    .into_iter()
                    .any(|c| (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&requested))
            })
            .unwrap_or(false);
        if supported {
            return Ok(requested);
        }

        let device_rate = device.default_output_config()?.sample_rate().0;
        tracing::warn!(
            requested,
            device_rate,
            "Configured sample rate not supported, using device default"
        );
        Ok(device_rate)
    }

    /// Start playback
    ///
    /// Moves the streamer into the device callback. A fixed buffer of
    /// `block_size` frames is requested first; if the device refuses, the
    /// default buffer size is used and the streamer simply sees differently
    /// sized blocks.
    pub fn start(&mut self, mut streamer: Streamer) -> Result<()> {
        if self.state == EngineState::Running {
            return Err(anyhow!("Engine already running"));
        }
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| anyhow!("No device selected"))?;

        let channels = device.default_output_config().map(|c| c.channels()).unwrap_or(2);
        if channels == 0 {
            return Err(AudioEngineError::NoOutputChannels.into());
        }
        let sample_rate = streamer.sample_rate();
        self.counters = Some(streamer.counters());

        let running = Arc::new(AtomicBool::new(true));
        self.stream_errors.store(0, Ordering::Relaxed);

        let mut config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let buffer_size = choose_buffer_size(self.block_size, |buffer_size| {
            let trial = StreamConfig {
                buffer_size,
                ..config.clone()
            };
            device.build_output_stream(
                &trial,
                |_: &mut [f32], _: &cpal::OutputCallbackInfo| {},
                |_| {},
                None,
            )
        });
        config.buffer_size = buffer_size;

        tracing::info!(
            device = self.device_name.as_deref().unwrap_or("default"),
            sample_rate,
            channels,
            buffer = ?config.buffer_size,
            "Opening output stream"
        );

        // Mono scratch, sized once; larger callbacks are rendered in chunks
        let mut scratch = vec![0.0f32; MAX_BLOCK_SIZE];
        let num_channels = channels as usize;
        let callback_running = Arc::clone(&running);
        let error_count = Arc::clone(&self.stream_errors);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !callback_running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    for chunk in data.chunks_mut(MAX_BLOCK_SIZE * num_channels) {
                        let frames = chunk.len() / num_channels;
                        let mono = &mut scratch[..frames];
                        streamer.on_block_requested(mono);
                        for (frame, &sample) in chunk.chunks_mut(num_channels).zip(mono.iter()) {
                            frame.fill(sample);
                        }
                    }
                },
                move |err| {
                    error_count.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(error = %err, "Output stream error");
                },
                None,
            )
            .map_err(|e| AudioEngineError::StreamError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioEngineError::StreamError(e.to_string()))?;

        self.stream = Some(stream);
        self.running = Some(running);
        self.state = EngineState::Running;
        tracing::info!("Audio engine started");
        Ok(())
    }

    /// Stop playback and release the stream
    pub fn stop(&mut self) -> Result<()> {
        if let Some(ref running) = self.running {
            running.store(false, Ordering::Relaxed);
        }
        let was_running = self.stream.take().is_some();
        self.running = None;
        self.state = EngineState::Stopped;

        if was_running {
            tracing::info!(
                samples = self.samples_rendered(),
                stream_errors = self.stream_errors.load(Ordering::Relaxed),
                "Audio engine stopped"
            );
        }
        Ok(())
    }

    /// Samples rendered by the streamer since start
    pub fn samples_rendered(&self) -> u64 {
        self.counters
            .as_ref()
            .map(|c| c.samples_rendered())
            .unwrap_or(0)
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_engine_creation() {
        let engine = PlaybackEngine::new(441);
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.block_size(), 441);
        assert!(engine.device_name().is_none());
    }

    #[test]
    fn test_block_size_clamped() {
        assert_eq!(PlaybackEngine::new(0).block_size(), 1);
        assert_eq!(PlaybackEngine::new(1 << 20).block_size(), MAX_BLOCK_SIZE);
    }

    #[test]
    fn test_start_without_device_fails() {
        use crate::audio::streamer::SynthSettings;
        use crate::stats::window::{InclusionFilter, SampleWindow};

        let window = Arc::new(SampleWindow::zeroed(InclusionFilter::accept_all()));
        let streamer = Streamer::new(window, &SynthSettings::default()).unwrap();
        let mut engine = PlaybackEngine::new(441);
        assert!(engine.start(streamer).is_err());
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    /// Stand-in stream that records when it is closed
    struct TrialStream(Rc<Cell<bool>>);

    impl Drop for TrialStream {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    #[test]
    fn test_trial_stream_closed_before_real_open() {
        let closed = Rc::new(Cell::new(false));
        let flag = Rc::clone(&closed);

        let size = choose_buffer_size(441, |size| {
            assert_eq!(size, cpal::BufferSize::Fixed(441));
            Ok::<_, String>(TrialStream(flag))
        });

        assert_eq!(size, cpal::BufferSize::Fixed(441));
        assert!(closed.get(), "trial stream must not hold the device");
    }

    #[test]
    fn test_rejected_fixed_size_falls_back() {
        let size = choose_buffer_size(441, |_| Err::<TrialStream, _>("unsupported"));
        assert_eq!(size, cpal::BufferSize::Default);
    }

    #[test]
    fn test_list_devices() {
        // May find nothing on CI, but shouldn't panic
        match PlaybackEngine::list_devices() {
            Ok(devices) => {
                for device in &devices {
                    println!("  - {} (out:{})", device.name, device.output_channels);
                }
            }
            Err(e) => println!("No audio devices available: {}", e),
        }
    }
}
