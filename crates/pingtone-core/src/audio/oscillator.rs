//! Additive oscillator bank
//!
//! One sine oscillator per percentile tier. Frequencies are fixed harmonic
//! multiples of the base step; amplitudes follow the ratio between adjacent
//! tiers, so a wide latency distribution sounds rich and a flat one collapses
//! to the bare fundamental.
//!
//! ## Amplitude law
//!
//! ```text
//! amp[i] = min(tier[i] / tier[i-1], ratio_ceiling) - 1
//! ```
//!
//! with `tier[-1]` a zero sentinel, so the base partial always plays at
//! `ratio_ceiling - 1` (1.0 by default) and is the loudest partial here.
//! The bank sums unscaled partials; the [`Streamer`](crate::Streamer)
//! multiplies the block by its master gain afterwards
//! ([`DEFAULT_GAIN`](crate::audio::streamer::DEFAULT_GAIN), 1/8), which
//! puts the base tone at 1/8 of full scale.

use crate::stats::percentile::PercentileTiers;
use crate::TIER_COUNT;
use std::f64::consts::TAU;
use thiserror::Error;

/// Frequency multiplier of each tier relative to the base step
pub const HARMONIC_MULTIPLIERS: [f64; TIER_COUNT] = [
    1.0,
    5.0 / 4.0,
    4.0 / 3.0,
    3.0 / 2.0,
    5.0 / 3.0,
    2.0,
    5.0 / 2.0,
    3.0,
];

/// Default upper bound on the ratio between adjacent tiers
pub const DEFAULT_RATIO_CEILING: f64 = 2.0;

/// Smallest accepted ratio ceiling (silences every partial)
pub const MIN_RATIO_CEILING: f64 = 1.0;

/// Largest accepted ratio ceiling
pub const MAX_RATIO_CEILING: f64 = 3.0;

/// Tier values are floored here before dividing
const TIER_FLOOR: f64 = 1.0;

/// Errors raised when configuring the amplitude law
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmplitudeLawError {
    #[error("Ratio ceiling must be within [{min}, {max}], got {value}")]
    InvalidRatioCeiling { value: f64, min: f64, max: f64 },
}

/// Maps percentile tiers to partial amplitudes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmplitudeLaw {
    ratio_ceiling: f64,
}

impl AmplitudeLaw {
    /// Create a law with the given ratio ceiling
    ///
    /// # Arguments
    /// * `ratio_ceiling` - Upper bound on `tier[i] / tier[i-1]`, within
    ///   [`MIN_RATIO_CEILING`, `MAX_RATIO_CEILING`]
    pub fn new(ratio_ceiling: f64) -> Result<Self, AmplitudeLawError> {
        if !(MIN_RATIO_CEILING..=MAX_RATIO_CEILING).contains(&ratio_ceiling) {
            return Err(AmplitudeLawError::InvalidRatioCeiling {
                value: ratio_ceiling,
                min: MIN_RATIO_CEILING,
                max: MAX_RATIO_CEILING,
            });
        }
        Ok(Self { ratio_ceiling })
    }

    /// Configured ratio ceiling
    pub fn ratio_ceiling(&self) -> f64 {
        self.ratio_ceiling
    }

    /// Amplitude of every partial for the given tiers
    ///
    /// Always finite: a divisor below 1 saturates the ratio at the ceiling.
    pub fn amplitudes(&self, tiers: &PercentileTiers) -> [f64; TIER_COUNT] {
        let mut amplitudes = [0.0; TIER_COUNT];
        let mut previous = 0.0;

        for (amplitude, tier) in amplitudes.iter_mut().zip(tiers.iter()) {
            let value = (tier as f64).max(TIER_FLOOR);
            let ratio = if previous < TIER_FLOOR {
                self.ratio_ceiling
            } else {
                (value / previous).min(self.ratio_ceiling)
            };
            *amplitude = ratio - 1.0;
            previous = value;
        }

        amplitudes
    }
}

impl Default for AmplitudeLaw {
    fn default() -> Self {
        Self {
            ratio_ceiling: DEFAULT_RATIO_CEILING,
        }
    }
}

/// Keep a phase inside [0, 1)
///
/// `rem_euclid` can round up to exactly 1.0 for tiny negative inputs, and a
/// non-finite step would otherwise poison the accumulator for good.
fn wrap_phase(phase: f64) -> f64 {
    let wrapped = phase.rem_euclid(1.0);
    if wrapped.is_finite() && wrapped < 1.0 {
        wrapped
    } else {
        0.0
    }
}

/// Bank of phase accumulators, one per tier
///
/// Phases persist across blocks so consecutive blocks join without clicks.
/// Rendering never allocates.
#[derive(Debug, Clone)]
pub struct OscillatorBank {
    phases: [f64; TIER_COUNT],
    law: AmplitudeLaw,
    amplitudes: [f64; TIER_COUNT],
}

impl OscillatorBank {
    /// Create a bank with every phase at zero
    pub fn new(law: AmplitudeLaw) -> Self {
        Self {
            phases: [0.0; TIER_COUNT],
            law,
            amplitudes: [0.0; TIER_COUNT],
        }
    }

    /// Add one block of all partials into `output`
    ///
    /// The caller zeroes `output` beforehand. `base_step` is the phase
    /// increment of the fundamental in cycles per sample.
    ///
    /// # Example
    /// ```
    /// use pingtone_core::{OscillatorBank, PercentileTiers};
    ///
    /// let mut bank = OscillatorBank::default();
    /// let mut block = [0.0f32; 64];
    /// bank.render_block(&PercentileTiers::flat(5000), 220.0 / 44100.0, &mut block);
    /// assert!(block.iter().any(|s| *s != 0.0));
    /// ```
    pub fn render_block(&mut self, tiers: &PercentileTiers, base_step: f64, output: &mut [f32]) {
        self.amplitudes = self.law.amplitudes(tiers);

        for (i, phase) in self.phases.iter_mut().enumerate() {
            let step = base_step * HARMONIC_MULTIPLIERS[i];
            let amplitude = self.amplitudes[i];

            for sample in output.iter_mut() {
                *sample += (amplitude * (TAU * *phase).sin()) as f32;
                *phase = wrap_phase(*phase + step);
            }
        }
    }

    /// Current phase of every oscillator, each in [0, 1)
    pub fn phases(&self) -> &[f64; TIER_COUNT] {
        &self.phases
    }

    /// Amplitudes used by the most recent block
    pub fn amplitudes(&self) -> &[f64; TIER_COUNT] {
        &self.amplitudes
    }

    /// Amplitude law in use
    pub fn law(&self) -> &AmplitudeLaw {
        &self.law
    }

    /// Reset every phase to zero
    pub fn reset(&mut self) {
        self.phases = [0.0; TIER_COUNT];
    }
}

impl Default for OscillatorBank {
    fn default() -> Self {
        Self::new(AmplitudeLaw::default())
    }
}
