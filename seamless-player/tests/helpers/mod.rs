//! Test helpers for seamless-player integration tests
//!
//! - `audio_generator`: WAV fixtures written with hound
//! - headless engine setup and manual rendering

#![allow(dead_code)]

pub mod audio_generator;

use seamless_common::config::EngineConfig;
use seamless_player::audio::{DecodedSource, SampleStream, CHANNELS};
use seamless_player::{BusRenderer, Engine};
use std::sync::Arc;
use std::time::Duration;

/// Working rate for engine tests; low to keep 30 s tracks small
pub const TEST_RATE: u32 = 8000;

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.audio.sample_rate = TEST_RATE;
    config
}

/// Headless engine at `TEST_RATE` with default timing
pub fn headless_engine() -> (Arc<Engine>, BusRenderer) {
    Engine::headless(test_config()).expect("headless engine")
}

/// Constant-level stereo track of `seconds` at `TEST_RATE`
pub fn constant_track(level: f32, seconds: f64) -> DecodedSource {
    let frames = (seconds * TEST_RATE as f64).round() as usize;
    DecodedSource::from_samples(vec![level; frames * CHANNELS], TEST_RATE)
}

/// Pull `seconds` of audio through the bus, returning the rendered samples.
pub fn render(renderer: &mut BusRenderer, seconds: f64) -> Vec<f32> {
    let frames = (seconds * TEST_RATE as f64).round() as usize;
    let mut out = vec![0.0; frames * CHANNELS];
    // Render in device-sized blocks
    for block in out.chunks_mut(512 * CHANNELS) {
        renderer.read(block);
    }
    out
}

/// Let the paused tokio clock run forward so tick tasks fire.
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}

pub fn approx(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}
