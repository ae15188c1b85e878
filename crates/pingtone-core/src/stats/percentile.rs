//! Rank-based percentile tiers
//!
//! Each audio block sorts a copy of the window and picks the values at
//! ranks 1, 2, 4, ... 128 from the top. With a 256-sample window these
//! approximate the P99.6, P99.2, P98.4, P97, P94, P88, P75 and P50 latencies.

use crate::{TIER_COUNT, WINDOW_SIZE};
use std::ops::Index;

/// 1-based rank (from the largest value) sampled for each tier
pub const TIER_RANKS: [usize; TIER_COUNT] = [1, 2, 4, 8, 16, 32, 64, 128];

/// Eight magnitudes ordered from the extreme (index 0) to the median (index 7)
///
/// Tier 0 is the base tier: it sets the fundamental frequency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PercentileTiers([u32; TIER_COUNT]);

impl PercentileTiers {
    /// Wrap raw tier values (index 0 = extreme, index 7 = median)
    pub const fn new(values: [u32; TIER_COUNT]) -> Self {
        Self(values)
    }

    /// Tiers where every value equals `value`
    pub const fn flat(value: u32) -> Self {
        Self([value; TIER_COUNT])
    }

    /// Base tier driving the fundamental
    pub fn base(&self) -> u32 {
        self.0[0]
    }

    /// Median tier (rank 128 of 256)
    pub fn median(&self) -> u32 {
        self.0[TIER_COUNT - 1]
    }

    /// All tier values
    pub fn as_array(&self) -> &[u32; TIER_COUNT] {
        &self.0
    }

    /// Iterate tier values from extreme to median
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

impl Index<usize> for PercentileTiers {
    type Output = u32;

    fn index(&self, index: usize) -> &u32 {
        &self.0[index]
    }
}

/// Derives [`PercentileTiers`] from a window snapshot
///
/// Sorting happens on a stack copy, so extraction never allocates and is
/// safe to call from the audio callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentileExtractor;

impl PercentileExtractor {
    /// Create an extractor
    pub fn new() -> Self {
        Self
    }

    /// Extract the tiers from a snapshot
    ///
    /// # Example
    /// ```
    /// use pingtone_core::PercentileExtractor;
    ///
    /// let tiers = PercentileExtractor::new().extract(&[1000; 256]);
    /// assert!(tiers.iter().all(|v| v == 1000));
    /// ```
    pub fn extract(&self, snapshot: &[u32; WINDOW_SIZE]) -> PercentileTiers {
        let mut sorted = *snapshot;
        sorted.sort_unstable_by(|a, b| b.cmp(a));

        let mut tiers = [0u32; TIER_COUNT];
        for (tier, &rank) in tiers.iter_mut().zip(TIER_RANKS.iter()) {
            *tier = sorted[rank - 1];
        }
        PercentileTiers(tiers)
    }
}
