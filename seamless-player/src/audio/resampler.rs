//! Audio resampling using rubato
//!
//! Converts decoded audio to the engine's working sample rate so that every
//! track on the mixer bus shares one format.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Audio resampler using rubato for sample rate conversion.
pub struct Resampler;

impl Resampler {
    /// Resample interleaved audio from `input_rate` to `output_rate`.
    ///
    /// # Arguments
    /// - `input`: Interleaved audio samples
    /// - `input_rate`: Input sample rate
    /// - `output_rate`: Working sample rate of the engine
    /// - `channels`: Number of interleaved channels
    ///
    /// # Notes
    /// If the rates already match, returns the input unchanged.
    pub fn resample(
        input: Vec<f32>,
        input_rate: u32,
        output_rate: u32,
        channels: u16,
    ) -> Result<Vec<f32>> {
        if input_rate == output_rate || input.is_empty() {
            return Ok(input);
        }
        if input_rate == 0 || channels == 0 {
            return Err(Error::Resample(format!(
                "Invalid source format: {}Hz, {} channels",
                input_rate, channels
            )));
        }

        debug!(
            "Resampling from {}Hz to {}Hz ({} channels)",
            input_rate, output_rate, channels
        );

        // rubato works on planar buffers
        let planar_input = Self::deinterleave(&input, channels);
        let input_frames = planar_input[0].len();

        let mut resampler = Self::create_resampler(input_rate, output_rate, channels, input_frames)?;

        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| Error::Resample(format!("Resampling failed: {}", e)))?;

        let interleaved_output = Self::interleave(planar_output);

        debug!(
            "Resampled {} input frames to {} output frames",
            input_frames,
            interleaved_output.len() / channels as usize
        );

        Ok(interleaved_output)
    }

    /// Create a rubato resampler that consumes the whole input as one chunk.
    fn create_resampler(
        input_rate: u32,
        output_rate: u32,
        channels: u16,
        chunk_size: usize,
    ) -> Result<FastFixedIn<f32>> {
        FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0, // no runtime ratio changes
            PolynomialDegree::Septic,
            chunk_size,
            channels as usize,
        )
        .map_err(|e| Error::Resample(format!("Failed to create resampler: {}", e)))
    }

    /// Convert interleaved samples to planar format.
    ///
    /// Input:  [L, R, L, R, L, R, ...]
    /// Output: [[L, L, L, ...], [R, R, R, ...]]
    fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
        let num_channels = channels as usize;
        let num_frames = samples.len() / num_channels;

        let mut planar = vec![Vec::with_capacity(num_frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (channel, sample) in planar.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }

        planar
    }

    /// Convert planar samples to interleaved format.
    fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
        if planar.is_empty() {
            return Vec::new();
        }

        let num_channels = planar.len();
        let num_frames = planar.iter().map(Vec::len).min().unwrap_or(0);
        let mut interleaved = Vec::with_capacity(num_frames * num_channels);

        for frame_idx in 0..num_frames {
            for channel in &planar {
                interleaved.push(channel[frame_idx]);
            }
        }

        interleaved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave() {
        let interleaved = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]; // 3 stereo frames
        let planar = Resampler::deinterleave(&interleaved, 2);

        assert_eq!(planar.len(), 2);
        assert_eq!(planar[0], vec![1.0, 3.0, 5.0]);
        assert_eq!(planar[1], vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_interleave() {
        let planar = vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]];
        assert_eq!(Resampler::interleave(planar), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(Resampler::interleave(Vec::new()).is_empty());
    }

    #[test]
    fn test_resample_same_rate() {
        let input = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let output = Resampler::resample(input.clone(), 44100, 44100, 2).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_resample_different_rate() {
        let input_rate = 48000;
        let duration_frames = 1000;

        let mut input = Vec::with_capacity(duration_frames * 2);
        for i in 0..duration_frames {
            let t = i as f32 / input_rate as f32;
            let sample = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
            input.push(sample);
            input.push(sample);
        }

        let output = Resampler::resample(input, input_rate, 44100, 2).unwrap();

        let expected_frames = (duration_frames as f64 * 44100.0 / input_rate as f64) as usize;
        let output_frames = output.len() / 2;
        assert!(
            output_frames >= expected_frames - 10 && output_frames <= expected_frames + 10,
            "Expected ~{} frames, got {}",
            expected_frames,
            output_frames
        );
    }

    #[test]
    fn test_invalid_format_rejected() {
        assert!(Resampler::resample(vec![0.0; 4], 0, 44100, 2).is_err());
    }
}
