//! Audio test file generation utilities
//!
//! Writes small deterministic WAV files with hound so the decoder can be
//! exercised against real files.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Generate a sine wave WAV file with 16-bit samples.
///
/// # Arguments
/// * `path` - Output file path
/// * `sample_rate` - File sample rate
/// * `channels` - 1 for mono, 2 for stereo
/// * `duration_ms` - Duration in milliseconds
/// * `frequency_hz` - Sine wave frequency
/// * `amplitude` - Amplitude 0.0-1.0
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    channels: u16,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total_frames = (sample_rate as u64 * duration_ms) / 1000;

    for frame in 0..total_frames {
        let t = frame as f32 / sample_rate as f32;
        let value = (2.0 * PI * frequency_hz * t).sin() * amplitude;
        let sample = (value * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(())
}

/// Generate a stereo WAV whose left channel is `left` and right channel is
/// `right` for every frame.
pub fn generate_constant_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    duration_ms: u64,
    left: f32,
    right: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total_frames = (sample_rate as u64 * duration_ms) / 1000;

    for _ in 0..total_frames {
        writer.write_sample(left)?;
        writer.write_sample(right)?;
    }

    writer.finalize()?;
    Ok(())
}
