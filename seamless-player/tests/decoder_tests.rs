//! Decoding generated WAV files and adding them as tracks

mod helpers;

use helpers::audio_generator::{generate_constant_wav, generate_sine_wav};
use helpers::{approx, test_config};
use seamless_player::audio::{DecodedSource, SimpleDecoder, CHANNELS};
use seamless_player::Engine;
use tempfile::TempDir;

#[test]
fn test_decode_stereo_wav() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("levels.wav");
    generate_constant_wav(&path, 8000, 1000, 0.25, -0.5).unwrap();

    let decoded = SimpleDecoder::decode_file(&path).unwrap();
    assert_eq!(decoded.sample_rate, 8000);
    assert_eq!(decoded.frames(), 8000);
    assert_eq!(decoded.samples[0], 0.25);
    assert_eq!(decoded.samples[1], -0.5);
}

#[test]
fn test_decode_mono_wav_to_stereo() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mono.wav");
    generate_sine_wav(&path, 8000, 1, 500, 440.0, 0.5).unwrap();

    let decoded = SimpleDecoder::decode_file(&path).unwrap();
    assert_eq!(decoded.frames(), 4000);
    for frame in decoded.samples.chunks_exact(CHANNELS) {
        assert_eq!(frame[0], frame[1]);
    }
}

#[test]
fn test_decode_resamples_to_working_rate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tone.wav");
    generate_sine_wav(&path, 22_050, 2, 1000, 440.0, 0.5).unwrap();

    let source = DecodedSource::open(&path, 44_100).unwrap();
    assert_eq!(source.sample_rate(), 44_100);
    assert!(
        approx(source.total_frames() as f64, 44_100.0, 20.0),
        "frames {}",
        source.total_frames()
    );
    assert!(approx(source.duration(), 1.0, 0.001));
}

#[test]
fn test_garbage_file_fails_to_decode() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.wav");
    std::fs::write(&path, b"definitely not a riff header").unwrap();

    assert!(SimpleDecoder::decode_file(&path).is_err());
}

#[tokio::test]
async fn test_add_track_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stream.wav");
    generate_sine_wav(&path, 8000, 2, 2000, 330.0, 0.4).unwrap();

    let (engine, _renderer) = Engine::headless(test_config()).unwrap();
    let id = engine
        .add_track(&path, Some("Stream".to_string()))
        .await
        .unwrap();

    let snapshot = engine.get_track(id).unwrap();
    assert!(!snapshot.degraded);
    assert_eq!(snapshot.track.name, "Stream");
    assert_eq!(snapshot.track.path, path);
    assert!(approx(snapshot.state.duration, 2.0, 0.001));
    assert_eq!(snapshot.state.loop_region.end, snapshot.state.duration);

    engine.shutdown();
}

#[tokio::test]
async fn test_undecodable_file_becomes_degraded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.mp3");
    std::fs::write(&path, vec![0u8; 4096]).unwrap();

    let (engine, _renderer) = Engine::headless(test_config()).unwrap();
    let id = engine.add_track(&path, None).await.unwrap();

    let snapshot = engine.get_track(id).unwrap();
    assert!(snapshot.degraded);
    assert_eq!(snapshot.state.duration, 0.0);

    engine.shutdown();
}
