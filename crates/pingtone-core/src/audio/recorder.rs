//! WAV recording of the synthesized output
//!
//! The audio callback never touches the file. It pushes finished blocks into
//! a lock-free ring buffer (the "tap"); a dedicated recorder thread drains
//! that buffer, converts to 16-bit PCM and appends to the WAV file.
//!
//! ## File Format
//!
//! Canonical 44-byte PCM header followed by little-endian `i16` samples:
//!
//! ```text
//! "RIFF" <size - 8> "WAVE" "fmt " 16 <format 1> <channels 1> <rate>
//! <rate * 2> <block align 2> <bits 16> "data" <data length> samples...
//! ```
//!
//! Both length fields are written as zero and patched when recording stops.

use ringbuf::traits::{Consumer, Observer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Size of the WAV header in bytes
pub const HEADER_LEN: u64 = 44;

/// Bytes per recorded sample
pub const BYTES_PER_SAMPLE: u64 = 2;

/// Samples popped from the tap per drain step
const DRAIN_CHUNK: usize = 4096;

/// Errors that can occur while recording
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Failed to create recording file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("WAV write failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("Failed to spawn recorder thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Recorder thread panicked")]
    Panicked,
}

/// Convert a float sample to 16-bit PCM, clamping to [-1, 1]
pub fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// WAV format of every recording: mono, 16-bit integer PCM
pub fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Create the ring buffer connecting a streamer to a recorder
///
/// # Arguments
/// * `capacity` - Buffered samples before the streamer starts dropping
pub fn recording_tap(capacity: usize) -> (HeapProd<f32>, HeapCons<f32>) {
    HeapRb::<f32>::new(capacity.max(1)).split()
}

/// Sequential WAV writer over any seekable destination
pub struct WavSink<W: Write + Seek> {
    writer: hound::WavWriter<W>,
    samples: u64,
}

impl<W: Write + Seek> WavSink<W> {
    /// Write the header and start accepting samples
    pub fn start(destination: W, sample_rate: u32) -> Result<Self, RecorderError> {
        let writer = hound::WavWriter::new(destination, wav_spec(sample_rate))?;
        Ok(Self { writer, samples: 0 })
    }

    /// Append a block of float samples as 16-bit PCM
    pub fn append(&mut self, block: &[f32]) -> Result<(), RecorderError> {
        for &sample in block {
            self.writer.write_sample(to_pcm16(sample))?;
        }
        self.samples += block.len() as u64;
        Ok(())
    }

    /// Samples appended so far
    pub fn samples_written(&self) -> u64 {
        self.samples
    }

    /// Patch both length fields and flush
    ///
    /// # Returns
    /// Total samples written
    pub fn stop(self) -> Result<u64, RecorderError> {
        let samples = self.samples;
        self.writer.finalize()?;
        Ok(samples)
    }
}

impl WavSink<BufWriter<File>> {
    /// Create `path` and write the header
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self, RecorderError> {
        let file = File::create(path).map_err(|source| RecorderError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        Self::start(BufWriter::with_capacity(64 * 1024, file), sample_rate)
    }
}

/// Handle returned by [`Recorder::start`] to stop recording
pub struct RecorderHandle {
    path: PathBuf,
    stop_flag: Arc<AtomicBool>,
    samples_written: Arc<AtomicU64>,
    thread: Option<std::thread::JoinHandle<Result<u64, RecorderError>>>,
}

impl RecorderHandle {
    /// Stop recording and finalize the file
    ///
    /// Samples already in the tap are written before the header is patched.
    /// Calling `stop` again returns the same total without side effects.
    pub fn stop(&mut self) -> Result<u64, RecorderError> {
        self.stop_flag.store(true, Ordering::Release);
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| RecorderError::Panicked)?,
            None => Ok(self.samples_written()),
        }
    }

    /// Check if the recorder thread is still alive
    pub fn is_alive(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Samples written to the file so far
    pub fn samples_written(&self) -> u64 {
        self.samples_written.load(Ordering::Relaxed)
    }

    /// File being written
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RecorderHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(error = %e, "Recorder failed while stopping");
        }
    }
}

/// Records the output tap to a WAV file on a background thread
pub struct Recorder {
    path: PathBuf,
    sample_rate: u32,
    drain_interval: Duration,
}

impl Recorder {
    /// Create a recorder writing to `path`
    pub fn new(path: PathBuf, sample_rate: u32) -> Self {
        Self {
            path,
            sample_rate,
            drain_interval: Duration::from_millis(10),
        }
    }

    /// Timestamped file name inside `dir`: `pingtone_YYYYMMDD_HHMMSS.wav`
    pub fn default_path(dir: &Path) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        dir.join(format!("pingtone_{}.wav", timestamp))
    }

    /// Create the file and spawn the recording thread
    ///
    /// Fails immediately if the file cannot be created.
    pub fn start(self, consumer: HeapCons<f32>) -> Result<RecorderHandle, RecorderError> {
        let sink = WavSink::create(&self.path, self.sample_rate)?;
        tracing::info!(
            path = %self.path.display(),
            sample_rate = self.sample_rate,
            "Recording started"
        );

        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&stop_flag);
        let samples_written = Arc::new(AtomicU64::new(0));
        let samples_clone = Arc::clone(&samples_written);
        let path = self.path.clone();

        let thread = std::thread::Builder::new()
            .name("wav-recorder".into())
            .spawn(move || self.recording_loop(sink, consumer, flag_clone, samples_clone))
            .map_err(RecorderError::Spawn)?;

        Ok(RecorderHandle {
            path,
            stop_flag,
            samples_written,
            thread: Some(thread),
        })
    }

    fn recording_loop(
        &self,
        mut sink: WavSink<BufWriter<File>>,
        mut consumer: HeapCons<f32>,
        stop_flag: Arc<AtomicBool>,
        samples_written: Arc<AtomicU64>,
    ) -> Result<u64, RecorderError> {
        let mut buf = vec![0.0f32; DRAIN_CHUNK];

        loop {
            // Read the flag before draining so everything pushed before the
            // stop request still reaches the file.
            let stopping = stop_flag.load(Ordering::Acquire);

            while !consumer.is_empty() {
                let read = consumer.pop_slice(&mut buf);
                if let Err(e) = sink.append(&buf[..read]) {
                    tracing::error!(
                        path = %self.path.display(),
                        error = %e,
                        "Failed to append samples"
                    );
                    return Err(e);
                }
            }
            samples_written.store(sink.samples_written(), Ordering::Relaxed);

            if stopping {
                break;
            }
            std::thread::sleep(self.drain_interval);
        }

        let total = sink.stop()?;
        samples_written.store(total, Ordering::Relaxed);
        tracing::info!(
            path = %self.path.display(),
            samples = total,
            seconds = total as f64 / self.sample_rate as f64,
            "Recording finalized"
        );
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::Producer;
    use std::io::Cursor;

    #[test]
    fn test_pcm_conversion_clamps() {
        assert_eq!(to_pcm16(0.0), 0);
        assert_eq!(to_pcm16(1.0), i16::MAX);
        assert_eq!(to_pcm16(1.7), i16::MAX);
        assert_eq!(to_pcm16(-1.0), -i16::MAX);
        assert_eq!(to_pcm16(-3.0), -i16::MAX);
        assert_eq!(to_pcm16(0.5), 16383);
    }

    #[test]
    fn test_header_layout() {
        let mut cursor = Cursor::new(Vec::new());
        let mut sink = WavSink::start(&mut cursor, 44100).unwrap();
        sink.append(&[0.0, 0.5, -0.5]).unwrap();
        assert_eq!(sink.stop().unwrap(), 3);

        let bytes = cursor.into_inner();
        assert_eq!(bytes.len() as u64, HEADER_LEN + 6);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 36 + 6);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 16);
        assert_eq!(u16::from_le_bytes([bytes[20], bytes[21]]), 1);
        assert_eq!(u16::from_le_bytes([bytes[22], bytes[23]]), 1);
        assert_eq!(u32::from_le_bytes(bytes[24..28].try_into().unwrap()), 44100);
        assert_eq!(u32::from_le_bytes(bytes[28..32].try_into().unwrap()), 88200);
        assert_eq!(u16::from_le_bytes([bytes[32], bytes[33]]), 2);
        assert_eq!(u16::from_le_bytes([bytes[34], bytes[35]]), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32::from_le_bytes(bytes[40..44].try_into().unwrap()), 6);
        assert_eq!(i16::from_le_bytes([bytes[46], bytes[47]]), 16383);
    }

    #[test]
    fn test_empty_recording() {
        let mut cursor = Cursor::new(Vec::new());
        let sink = WavSink::start(&mut cursor, 48000).unwrap();
        assert_eq!(sink.stop().unwrap(), 0);
        assert_eq!(cursor.into_inner().len() as u64, HEADER_LEN);
    }

    #[test]
    fn test_create_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.wav");
        let result = WavSink::create(&path, 44100);
        assert!(matches!(result, Err(RecorderError::Create { .. })));
    }

    #[test]
    fn test_recorder_thread_drains_before_finalizing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tap.wav");
        let (mut prod, cons) = recording_tap(8192);

        let mut handle = Recorder::new(path.clone(), 44100).start(cons).unwrap();
        assert!(handle.is_alive());
        prod.push_slice(&[0.25f32; 3000]);

        let total = handle.stop().unwrap();
        assert_eq!(total, 3000);
        assert_eq!(handle.stop().unwrap(), 3000, "stop must be idempotent");

        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, HEADER_LEN + 3000 * BYTES_PER_SAMPLE);
    }

    #[test]
    fn test_default_path_is_timestamped() {
        let path = Recorder::default_path(Path::new("/tmp"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("pingtone_"));
        assert!(name.ends_with(".wav"));
        assert_eq!(name.len(), "pingtone_YYYYMMDD_HHMMSS.wav".len());
    }
}
