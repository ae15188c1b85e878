//! E2E tests for WAV recording of the synthesized output

use pingtone::audio::recorder::{recording_tap, HEADER_LEN};
use pingtone::audio::recorder::WavSink;
use pingtone::{ClockedHost, InclusionFilter, Recorder, SampleWindow, Streamer, SynthSettings};
use std::sync::Arc;

#[test]
fn test_file_layout_matches_sample_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layout.wav");

    let mut sink = WavSink::create(&path, 44100).unwrap();
    for k in 0..7 {
        let block: Vec<f32> = (0..100).map(|i| ((i + k) as f32 / 100.0).sin()).collect();
        sink.append(&block).unwrap();
    }
    let samples = sink.stop().unwrap();
    assert_eq!(samples, 700);

    let bytes = std::fs::read(&path).unwrap();
    let data_len = u32::from_le_bytes(bytes[40..44].try_into().unwrap()) as u64;
    let riff_len = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as u64;
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[8..12], b"WAVE");
    assert_eq!(&bytes[36..40], b"data");
    assert_eq!(data_len, 2 * samples);
    assert_eq!(bytes.len() as u64, HEADER_LEN + data_len);
    assert_eq!(riff_len, bytes.len() as u64 - 8);
}

#[test]
fn test_clamped_extremes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clamp.wav");

    let mut sink = WavSink::create(&path, 8000).unwrap();
    sink.append(&[2.0, -2.0, 1.0, -1.0, 0.0]).unwrap();
    sink.stop().unwrap();

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 8000);
    assert_eq!(spec.bits_per_sample, 16);

    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples, vec![i16::MAX, -i16::MAX, i16::MAX, -i16::MAX, 0]);
}

#[test]
fn test_recorder_captures_streamer_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");

    let window = SampleWindow::zeroed(InclusionFilter::accept_all());
    for i in 0..256u32 {
        window.record(2000 + i * 100, 0);
    }

    let (tap, drain) = recording_tap(44100);
    let mut handle = Recorder::new(path.clone(), 44100).start(drain).unwrap();
    let mut streamer = Streamer::new(Arc::new(window), &SynthSettings::default())
        .unwrap()
        .with_tap(tap);

    let mut rendered = Vec::new();
    ClockedHost::new(44100, 441).render(&mut streamer, 20, |block| {
        rendered.extend_from_slice(block)
    });

    let written = handle.stop().unwrap();
    assert_eq!(written, 8820);
    assert_eq!(handle.stop().unwrap(), written);
    assert!(!handle.is_alive());

    let mut reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.len() as u64, written);
    let recorded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    for (pcm, float) in recorded.iter().zip(rendered.iter()) {
        let expected = (float.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        assert_eq!(*pcm, expected);
    }
}

#[test]
fn test_unwritable_destination_fails_at_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("dir").join("out.wav");
    let (_tap, drain) = recording_tap(16);
    assert!(Recorder::new(path, 44100).start(drain).is_err());
}
