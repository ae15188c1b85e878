//! Fixed-size window of the most recent raw measurements
//!
//! The window is written by the network producer and read by the audio
//! callback without any lock. Every slot is an atomic accessed with relaxed
//! ordering, so a snapshot taken while the producer is writing may mix old
//! and new values. That staleness is tolerated: a few slots out of 256 do not
//! audibly change the percentile tiers.

use crate::WINDOW_SIZE;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Mean of the synthetic seed distribution (µs)
const SEED_MEAN: f64 = 10_000.0;

/// Standard deviation of the synthetic seed distribution (µs)
const SEED_STD_DEV: f64 = 10_000.0;

// The cursor is a u8 so that wrapping at 256 is free.
const _: () = assert!(WINDOW_SIZE == u8::MAX as usize + 1);

/// Set of tags accepted into the window
///
/// An empty filter accepts every tag. The set is expected to hold a handful
/// of tags, so membership is a linear scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InclusionFilter {
    tags: Box<[u8]>,
}

impl InclusionFilter {
    /// Create a filter accepting only the given tags
    ///
    /// Passing no tags yields a filter that accepts everything.
    pub fn new(tags: impl IntoIterator<Item = u8>) -> Self {
        let mut tags: Vec<u8> = tags.into_iter().collect();
        tags.sort_unstable();
        tags.dedup();
        Self {
            tags: tags.into_boxed_slice(),
        }
    }

    /// Filter that accepts every tag
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Whether a record carrying `tag` should be written
    pub fn accepts(&self, tag: u8) -> bool {
        self.tags.is_empty() || self.tags.contains(&tag)
    }

    /// Whether the filter accepts every tag
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Configured tags, sorted
    pub fn tags(&self) -> &[u8] {
        &self.tags
    }
}

/// Ring of the 256 most recently recorded magnitudes
///
/// # Example
/// ```
/// use pingtone_core::{InclusionFilter, SampleWindow};
///
/// let window = SampleWindow::zeroed(InclusionFilter::accept_all());
/// window.record(1500, 0);
/// assert_eq!(window.snapshot()[0], 1500);
/// ```
#[derive(Debug)]
pub struct SampleWindow {
    slots: [AtomicU32; WINDOW_SIZE],
    cursor: AtomicU8,
    writes: AtomicU64,
    filter: InclusionFilter,
}

impl SampleWindow {
    /// Create a window seeded from the thread-local RNG
    ///
    /// Seeding keeps the tone defined before the first real measurement.
    pub fn new(filter: InclusionFilter) -> Self {
        Self::seeded(filter, &mut rand::thread_rng())
    }

    /// Create a window seeded with a normal distribution drawn from `rng`
    ///
    /// # Arguments
    /// * `filter` - Inclusion filter applied to every [`record`](Self::record)
    /// * `rng` - Source of the synthetic seed values
    pub fn seeded<R: Rng + ?Sized>(filter: InclusionFilter, rng: &mut R) -> Self {
        let window = Self::zeroed(filter);
        for slot in &window.slots {
            let z: f64 = StandardNormal.sample(rng);
            let value = (z * SEED_STD_DEV + SEED_MEAN).clamp(0.0, u32::MAX as f64);
            slot.store(value as u32, Ordering::Relaxed);
        }
        window
    }

    /// Create a window with every slot at zero
    pub fn zeroed(filter: InclusionFilter) -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicU32::new(0)),
            cursor: AtomicU8::new(0),
            writes: AtomicU64::new(0),
            filter,
        }
    }

    /// Record a measurement
    ///
    /// Records whose tag is rejected by the inclusion filter are ignored.
    /// Otherwise the value overwrites the oldest slot. Never blocks.
    pub fn record(&self, magnitude: u32, tag: u8) {
        if !self.filter.accepts(tag) {
            return;
        }
        // fetch_add on an AtomicU8 wraps at 256
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.slots[slot as usize].store(magnitude, Ordering::Relaxed);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy every slot in storage order
    ///
    /// Relaxed read: concurrent writes may be partially visible.
    pub fn snapshot(&self) -> [u32; WINDOW_SIZE] {
        std::array::from_fn(|i| self.slots[i].load(Ordering::Relaxed))
    }

    /// Copy every slot ordered from oldest to newest write
    pub fn chronological(&self) -> [u32; WINDOW_SIZE] {
        let start = self.cursor() as usize;
        let snapshot = self.snapshot();
        std::array::from_fn(|i| snapshot[(start + i) % WINDOW_SIZE])
    }

    /// Slot the next accepted record will overwrite
    pub fn cursor(&self) -> u8 {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Number of records accepted since creation
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Inclusion filter applied to incoming records
    pub fn filter(&self) -> &InclusionFilter {
        &self.filter
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new(InclusionFilter::accept_all())
    }
}
