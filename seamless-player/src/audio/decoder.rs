//! Audio decoder using symphonia
//!
//! Decodes a whole file (MP3, WAV, FLAC, Ogg Vorbis, AAC/M4A) into memory as
//! interleaved stereo f32 and hands it to the resampler so the result is in
//! the engine's working format.

use super::resampler::Resampler;
use super::types::CHANNELS;
use crate::error::{Error, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Fully decoded PCM audio
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved stereo samples
    pub samples: Vec<f32>,

    /// Sample rate of `samples`
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Number of stereo frames
    pub fn frames(&self) -> usize {
        self.samples.len() / CHANNELS
    }
}

/// Simple whole-file audio decoder.
pub struct SimpleDecoder;

impl SimpleDecoder {
    /// Decode a file and resample it to `working_rate`.
    pub fn decode_to_rate(path: &Path, working_rate: u32) -> Result<DecodedAudio> {
        let decoded = Self::decode_file(path)?;
        if decoded.sample_rate == working_rate {
            return Ok(decoded);
        }

        let samples = Resampler::resample(
            decoded.samples,
            decoded.sample_rate,
            working_rate,
            CHANNELS as u16,
        )?;
        Ok(DecodedAudio {
            samples,
            sample_rate: working_rate,
        })
    }

    /// Decode an entire audio file to interleaved stereo f32 samples.
    ///
    /// Mono sources are duplicated to both channels; sources with more than
    /// two channels keep their first two.
    ///
    /// # Errors
    /// - Failed to open file
    /// - Unsupported audio format
    /// - No decodable audio track
    pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
        debug!("Decoding entire file: {}", path.display());

        let file = std::fs::File::open(path)
            .map_err(|e| Error::Decode(format!("Failed to open file {}: {}", path.display(), e)))?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Help the format registry guess the container
        let mut hint = Hint::new();
        if let Some(ext_str) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext_str);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut samples = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("Reached end of file");
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    debug!("Stream reset requested, treating as end of file");
                    break;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    Self::push_stereo(buffer.samples(), spec.channels.count(), &mut samples);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt packet: skip it and keep going
                    warn!("Decode error: {}", e);
                }
                Err(e) => {
                    warn!("Decoder failed: {}", e);
                    break;
                }
            }
        }

        if samples.is_empty() {
            return Err(Error::Decode(format!(
                "No audio decoded from {}",
                path.display()
            )));
        }

        debug!(
            "Decoded {} frames at {}Hz",
            samples.len() / CHANNELS,
            sample_rate
        );

        Ok(DecodedAudio {
            samples,
            sample_rate,
        })
    }

    /// Append interleaved `source_channels` samples as interleaved stereo.
    fn push_stereo(interleaved: &[f32], source_channels: usize, output: &mut Vec<f32>) {
        match source_channels {
            0 => {}
            1 => {
                output.reserve(interleaved.len() * 2);
                for &sample in interleaved {
                    output.push(sample);
                    output.push(sample);
                }
            }
            2 => output.extend_from_slice(interleaved),
            n => {
                output.reserve(interleaved.len() / n * 2);
                for frame in interleaved.chunks_exact(n) {
                    output.push(frame[0]);
                    output.push(frame[1]);
                }
            }
        }
    }
}
