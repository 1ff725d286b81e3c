//! In-memory decoded audio source
//!
//! `DecodedSource` is the control-side handle of a track's audio: it knows
//! the duration and can seek. `SourceReader` is the rendering-side half
//! that walks the same samples. Both share one atomic frame cursor, so a
//! seek from the control side takes effect on the next pull.

use super::decoder::{DecodedAudio, SimpleDecoder};
use super::resampler::Resampler;
use super::types::{SampleStream, CHANNELS};
use crate::error::Result;
use seamless_common::time::{frames_to_seconds, seconds_to_frames};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Decoded track audio with a shared playback cursor
#[derive(Debug, Clone)]
pub struct DecodedSource {
    samples: Arc<[f32]>,
    sample_rate: u32,
    cursor: Arc<AtomicUsize>,
}

impl DecodedSource {
    /// Decode `path` into the working format.
    ///
    /// Blocking: callers on the async runtime go through `spawn_blocking`.
    pub fn open(path: &Path, working_rate: u32) -> Result<Self> {
        let decoded = SimpleDecoder::decode_to_rate(path, working_rate)?;
        Ok(Self::from_decoded(decoded))
    }

    pub fn from_decoded(decoded: DecodedAudio) -> Self {
        Self::from_samples(decoded.samples, decoded.sample_rate)
    }

    /// Wrap interleaved stereo samples already at `sample_rate`.
    ///
    /// A trailing half frame is dropped.
    pub fn from_samples(mut samples: Vec<f32>, sample_rate: u32) -> Self {
        samples.truncate(samples.len() - samples.len() % CHANNELS);
        Self {
            samples: samples.into(),
            sample_rate: sample_rate.max(1),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Generate a stereo sine tone, mostly for tests and demos.
    pub fn sine(frequency: f32, amplitude: f32, seconds: f64, sample_rate: u32) -> Self {
        let frames = seconds_to_frames(seconds, sample_rate);
        let mut samples = Vec::with_capacity(frames * CHANNELS);
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let value = (2.0 * std::f32::consts::PI * frequency * t).sin() * amplitude;
            samples.push(value);
            samples.push(value);
        }
        Self::from_samples(samples, sample_rate)
    }

    /// Convert to `working_rate`; the cursor is reset.
    pub fn into_rate(self, working_rate: u32) -> Result<Self> {
        if self.sample_rate == working_rate {
            return Ok(self);
        }
        let samples = Resampler::resample(
            self.samples.to_vec(),
            self.sample_rate,
            working_rate,
            CHANNELS as u16,
        )?;
        Ok(Self::from_samples(samples, working_rate))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn total_frames(&self) -> usize {
        self.samples.len() / CHANNELS
    }

    /// Track length in seconds
    pub fn duration(&self) -> f64 {
        frames_to_seconds(self.total_frames(), self.sample_rate)
    }

    /// Current read position in seconds
    pub fn position(&self) -> f64 {
        frames_to_seconds(self.cursor.load(Ordering::Acquire), self.sample_rate)
    }

    /// Move the read position, clamped to the track.
    ///
    /// Returns the position actually applied in seconds.
    pub fn seek(&self, seconds: f64) -> f64 {
        let frame = seconds_to_frames(seconds, self.sample_rate).min(self.total_frames());
        self.cursor.store(frame, Ordering::Release);
        frames_to_seconds(frame, self.sample_rate)
    }

    /// Rendering-side reader sharing this source's cursor
    pub fn reader(&self) -> SourceReader {
        SourceReader {
            samples: Arc::clone(&self.samples),
            cursor: Arc::clone(&self.cursor),
        }
    }
}

/// Pull-side view of a `DecodedSource`
pub struct SourceReader {
    samples: Arc<[f32]>,
    cursor: Arc<AtomicUsize>,
}

impl SampleStream for SourceReader {
    fn read(&mut self, out: &mut [f32]) -> usize {
        let total_frames = self.samples.len() / CHANNELS;
        let wanted_frames = out.len() / CHANNELS;

        let start = self.cursor.load(Ordering::Acquire);
        if start >= total_frames || wanted_frames == 0 {
            return 0;
        }
        let frames = wanted_frames.min(total_frames - start);
        let count = frames * CHANNELS;
        out[..count].copy_from_slice(&self.samples[start * CHANNELS..start * CHANNELS + count]);

        // A seek that landed while we were copying wins over our advance
        let _ = self.cursor.compare_exchange(
            start,
            start + frames,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        count
    }
}
