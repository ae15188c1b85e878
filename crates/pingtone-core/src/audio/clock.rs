//! Software block clock
//!
//! Stands in for the audio device when running headless: a dedicated thread
//! asks the [`Streamer`] for one block every `block_size / sample_rate`
//! seconds, paced against an absolute deadline so sleep jitter does not
//! accumulate.

use crate::audio::streamer::Streamer;
use crate::shutdown::ShutdownListener;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Paces a [`Streamer`] without an audio device
#[derive(Debug, Clone, Copy)]
pub struct ClockedHost {
    sample_rate: u32,
    block_size: usize,
}

impl ClockedHost {
    /// Create a clock producing `block_size` frames per tick
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            block_size: block_size.max(1),
        }
    }

    /// Real-time duration of one block
    pub fn block_period(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64)
    }

    /// Frames per block
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Render `blocks` blocks back to back, without pacing
    ///
    /// `sink` receives each finished block.
    pub fn render(&self, streamer: &mut Streamer, blocks: usize, mut sink: impl FnMut(&[f32])) {
        let mut block = vec![0.0f32; self.block_size];
        for _ in 0..blocks {
            streamer.on_block_requested(&mut block);
            sink(&block);
        }
    }

    /// Spawn the clock thread
    ///
    /// The thread exits within one block period of the shutdown signal and
    /// hands the streamer back through [`ClockHandle::join`].
    pub fn spawn(
        self,
        mut streamer: Streamer,
        shutdown: ShutdownListener,
    ) -> std::io::Result<ClockHandle> {
        let ticks = Arc::new(AtomicU64::new(0));
        let ticks_clone = Arc::clone(&ticks);

        let thread = std::thread::Builder::new()
            .name("block-clock".into())
            .spawn(move || {
                let period = self.block_period();
                let mut block = vec![0.0f32; self.block_size];
                let mut deadline = Instant::now();
                let mut late_blocks = 0u64;

                tracing::info!(
                    sample_rate = self.sample_rate,
                    block_size = self.block_size,
                    period_us = period.as_micros() as u64,
                    "Block clock running"
                );

                while !shutdown.is_triggered() {
                    streamer.on_block_requested(&mut block);
                    ticks_clone.fetch_add(1, Ordering::Relaxed);

                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        std::thread::sleep(deadline - now);
                    } else {
                        // Behind schedule: resync instead of bursting to catch up
                        late_blocks += 1;
                        deadline = now;
                    }
                }

                tracing::info!(
                    blocks = ticks_clone.load(Ordering::Relaxed),
                    late_blocks,
                    "Block clock stopped"
                );
                streamer
            })?;

        Ok(ClockHandle {
            ticks,
            thread: Some(thread),
        })
    }
}

/// Handle to a running [`ClockedHost`] thread
pub struct ClockHandle {
    ticks: Arc<AtomicU64>,
    thread: Option<std::thread::JoinHandle<Streamer>>,
}

impl ClockHandle {
    /// Blocks rendered so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Wait for the clock thread to exit after shutdown
    ///
    /// # Returns
    /// The streamer, or `None` if the thread panicked or was already joined
    pub fn join(&mut self) -> Option<Streamer> {
        self.thread.take().and_then(|h| h.join().ok())
    }
}
