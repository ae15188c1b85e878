//! Magnitude to oscillator step mapping
//!
//! A latency is compressed logarithmically into a base frequency between
//! 100 Hz and 400 Hz, then normalized by the sample rate into a per-sample
//! phase increment ("step", in cycles per sample).

/// Scale applied to `ln(1 + magnitude)`
pub const LOG_SCALE: f64 = 30.0;

/// Lowest base frequency in Hz (reached around 27µs)
pub const MIN_BASE_HZ: f64 = 100.0;

/// Highest base frequency in Hz (reached around 620ms)
pub const MAX_BASE_HZ: f64 = 400.0;

/// Converts raw magnitudes into phase increments
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepMapper {
    sample_rate: f64,
}

impl StepMapper {
    /// Create a mapper for the given output sample rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f64,
        }
    }

    /// Phase increment for a magnitude
    ///
    /// Monotonically non-decreasing, saturating at `MIN_BASE_HZ` and
    /// `MAX_BASE_HZ` divided by the sample rate.
    ///
    /// # Example
    /// ```
    /// use pingtone_core::StepMapper;
    ///
    /// let mapper = StepMapper::new(44100);
    /// assert_eq!(mapper.to_step(0), 100.0 / 44100.0);
    /// assert_eq!(mapper.to_step(u32::MAX), 400.0 / 44100.0);
    /// ```
    pub fn to_step(&self, magnitude: u32) -> f64 {
        let raw = LOG_SCALE * (magnitude.max(1) as f64).ln_1p();
        raw.clamp(MIN_BASE_HZ, MAX_BASE_HZ) / self.sample_rate
    }

    /// Frequency in Hz produced by a step
    pub fn frequency_hz(&self, step: f64) -> f64 {
        step * self.sample_rate
    }

    /// Output sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate as u32
    }
}

impl Default for StepMapper {
    fn default() -> Self {
        Self::new(crate::DEFAULT_SAMPLE_RATE)
    }
}
