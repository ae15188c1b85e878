//! Per-block audio callback driver
//!
//! [`Streamer`] is the single entry point the audio host calls whenever it
//! needs the next block of samples:
//!
//! ```text
//! window.snapshot() -> extractor.extract() -> mapper.to_step(tiers[0])
//!     -> bank.render_block() -> gain -> recorder tap
//! ```
//!
//! Everything on this path is fixed-size. The streamer never allocates,
//! locks or logs; finished blocks go to the recorder through a lock-free
//! ring buffer and periodic [`BlockReport`]s go out over a bounded channel
//! with `try_send`.

use crate::audio::oscillator::{AmplitudeLaw, AmplitudeLawError, OscillatorBank};
use crate::audio::step::StepMapper;
use crate::stats::percentile::{PercentileExtractor, PercentileTiers};
use crate::stats::window::SampleWindow;
use crate::TIER_COUNT;
use crossbeam_channel::Sender;
use ringbuf::traits::Producer;
use ringbuf::HeapProd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default master gain: a 1/8 budget per partial keeps eight unit partials
/// inside [-1, 1]
pub const DEFAULT_GAIN: f32 = 1.0 / TIER_COUNT as f32;

/// Synthesis parameters fixed at startup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthSettings {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Upper bound on the ratio between adjacent tiers
    pub ratio_ceiling: f64,
    /// Master gain applied after summing the partials
    pub gain: f32,
}

impl Default for SynthSettings {
    fn default() -> Self {
        Self {
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
            ratio_ceiling: crate::audio::oscillator::DEFAULT_RATIO_CEILING,
            gain: DEFAULT_GAIN,
        }
    }
}

/// Snapshot of the synthesis state, emitted periodically for logging
#[derive(Debug, Clone)]
pub struct BlockReport {
    /// Number of blocks rendered before this one
    pub block: u64,
    /// Total samples rendered including this block
    pub samples_rendered: u64,
    /// Tiers used for this block
    pub tiers: PercentileTiers,
    /// Partial amplitudes used for this block
    pub amplitudes: [f64; TIER_COUNT],
    /// Base phase increment in cycles per sample
    pub base_step: f64,
    /// Fundamental frequency in Hz
    pub base_hz: f64,
}

/// Counters shared between the streamer and the supervising thread
#[derive(Debug, Default)]
pub struct StreamerCounters {
    samples_rendered: AtomicU64,
    tap_dropped: AtomicU64,
}

impl StreamerCounters {
    /// Samples written to the output so far
    pub fn samples_rendered(&self) -> u64 {
        self.samples_rendered.load(Ordering::Relaxed)
    }

    /// Samples the recorder tap could not accept because it was full
    pub fn tap_dropped(&self) -> u64 {
        self.tap_dropped.load(Ordering::Relaxed)
    }
}

/// Real-time block driver owning the synthesis state
pub struct Streamer {
    window: Arc<SampleWindow>,
    extractor: PercentileExtractor,
    mapper: StepMapper,
    bank: OscillatorBank,
    gain: f32,
    tap: Option<HeapProd<f32>>,
    reports: Option<Sender<BlockReport>>,
    report_interval: u64,
    next_report_at: u64,
    blocks: u64,
    samples_rendered: u64,
    counters: Arc<StreamerCounters>,
}

impl Streamer {
    /// Create a streamer reading from `window`
    ///
    /// # Arguments
    /// * `window` - Sample window shared with the producer
    /// * `settings` - Sample rate, ratio ceiling and gain
    pub fn new(
        window: Arc<SampleWindow>,
        settings: &SynthSettings,
    ) -> Result<Self, AmplitudeLawError> {
        let law = AmplitudeLaw::new(settings.ratio_ceiling)?;
        Ok(Self {
            window,
            extractor: PercentileExtractor::new(),
            mapper: StepMapper::new(settings.sample_rate),
            bank: OscillatorBank::new(law),
            gain: settings.gain,
            tap: None,
            reports: None,
            report_interval: u64::MAX,
            next_report_at: 0,
            blocks: 0,
            samples_rendered: 0,
            counters: Arc::new(StreamerCounters::default()),
        })
    }

    /// Forward every rendered block into a recorder ring buffer
    pub fn with_tap(mut self, tap: HeapProd<f32>) -> Self {
        self.tap = Some(tap);
        self
    }

    /// Emit a [`BlockReport`] at most once every `interval_samples`
    ///
    /// The first block is always reported. Reports are dropped when the
    /// channel is full.
    pub fn with_reports(mut self, sender: Sender<BlockReport>, interval_samples: u64) -> Self {
        self.reports = Some(sender);
        self.report_interval = interval_samples.max(1);
        self.next_report_at = 0;
        self
    }

    /// Fill `output` with the next block of the tone
    ///
    /// Called by the audio host once per block. Bounded time, no allocation.
    pub fn on_block_requested(&mut self, output: &mut [f32]) {
        output.fill(0.0);

        let snapshot = self.window.snapshot();
        let tiers = self.extractor.extract(&snapshot);
        let base_step = self.mapper.to_step(tiers.base());
        self.bank.render_block(&tiers, base_step, output);

        if self.gain != 1.0 {
            for sample in output.iter_mut() {
                *sample *= self.gain;
            }
        }

        if let Some(tap) = self.tap.as_mut() {
            let pushed = tap.push_slice(output);
            if pushed < output.len() {
                self.counters
                    .tap_dropped
                    .fetch_add((output.len() - pushed) as u64, Ordering::Relaxed);
            }
        }

        self.samples_rendered += output.len() as u64;
        self.counters
            .samples_rendered
            .store(self.samples_rendered, Ordering::Relaxed);

        if let Some(sender) = self.reports.as_ref() {
            if self.samples_rendered > self.next_report_at {
                let _ = sender.try_send(BlockReport {
                    block: self.blocks,
                    samples_rendered: self.samples_rendered,
                    tiers,
                    amplitudes: *self.bank.amplitudes(),
                    base_step,
                    base_hz: self.mapper.frequency_hz(base_step),
                });
                self.next_report_at = self.samples_rendered.saturating_add(self.report_interval);
            }
        }

        self.blocks += 1;
    }

    /// Shared counters readable from other threads
    pub fn counters(&self) -> Arc<StreamerCounters> {
        Arc::clone(&self.counters)
    }

    /// Oscillator bank state
    pub fn bank(&self) -> &OscillatorBank {
        &self.bank
    }

    /// Blocks rendered so far
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Samples rendered so far
    pub fn samples_rendered(&self) -> u64 {
        self.samples_rendered
    }

    /// Output sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.mapper.sample_rate()
    }
}
