//! Audio output using cpal
//!
//! Pulls the mixed stream at device cadence and converts it to whatever
//! sample format and channel layout the device wants. A cpal `Stream` is
//! not `Send`, so the output lives on its own thread (`OutputThread`) for
//! the lifetime of the engine.

use super::types::{SampleStream, CHANNELS};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Frames pre-allocated for the render scratch buffer
const SCRATCH_FRAMES: usize = 4096;

/// Audio output manager using cpal.
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    /// Set by the stream error callback
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
}

impl AudioOutput {
    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an audio device for output.
    ///
    /// # Arguments
    /// - `device_name`: Optional device name (None = default device)
    /// - `preferred_rate`: Working sample rate to ask the device for
    /// - `buffer_size`: Optional buffer size in frames (None = device default)
    ///
    /// # Fallback Behavior
    /// If the requested device is not found the default device is used. The
    /// device may not support `preferred_rate`; check `sample_rate()` for
    /// the rate actually in use.
    pub fn new(
        device_name: Option<&str>,
        preferred_rate: u32,
        buffer_size: Option<u32>,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(name) => {
                let mut devices = host.output_devices().map_err(|e| {
                    Error::AudioOutput(format!("Failed to enumerate devices: {}", e))
                })?;

                match devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                    Some(dev) => {
                        info!("Found requested audio device: {}", name);
                        dev
                    }
                    None => {
                        warn!(
                            "Requested device '{}' not found, falling back to default device",
                            name
                        );
                        host.default_output_device().ok_or_else(|| {
                            Error::AudioOutput(format!(
                                "Device '{}' not found and no default device available",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
        };

        info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let (mut config, sample_format) = Self::get_best_config(&device, preferred_rate)?;

        if let Some(size) = buffer_size {
            config.buffer_size = cpal::BufferSize::Fixed(size);
            debug!("Using requested buffer size: {} frames", size);
        }

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
            config.sample_rate.0, config.channels, sample_format, config.buffer_size
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
            error_flag: Arc::new(AtomicBool::new(false)),
            error_count: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Pick a device configuration.
    ///
    /// Prefers stereo f32 at `preferred_rate`, otherwise the device default.
    fn get_best_config(device: &Device, preferred_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported_configs = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported_configs.find(|config| {
            config.channels() as usize == CHANNELS
                && config.min_sample_rate().0 <= preferred_rate
                && config.max_sample_rate().0 >= preferred_rate
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(supported_config) = preferred {
            let sample_format = supported_config.sample_format();
            let config = supported_config
                .with_sample_rate(cpal::SampleRate(preferred_rate))
                .config();
            return Ok((config, sample_format));
        }

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

        warn!(
            "Device does not offer stereo f32 at {}Hz, using default config ({}Hz, {:?})",
            preferred_rate,
            supported_config.sample_rate().0,
            supported_config.sample_format()
        );

        let sample_format = supported_config.sample_format();
        Ok((supported_config.config(), sample_format))
    }

    /// Start the output stream, pulling from `source`.
    ///
    /// `source` runs on the real-time audio thread and must not block.
    /// Short reads are padded with silence.
    pub fn start<S>(&mut self, source: S) -> Result<()>
    where
        S: SampleStream + 'static,
    {
        info!("Starting audio stream");

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32, S>(source, |s| s)?,
            SampleFormat::I16 => {
                self.build_stream::<i16, S>(source, |s| (s * i16::MAX as f32) as i16)?
            }
            SampleFormat::U16 => {
                self.build_stream::<u16, S>(source, |s| ((s + 1.0) * 32767.5) as u16)?
            }
            sample_format => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);

        info!("Audio stream started successfully");
        Ok(())
    }

    fn build_stream<T, S>(&self, mut source: S, convert: fn(f32) -> T) -> Result<Stream>
    where
        T: SizedSample + Send + 'static,
        S: SampleStream + 'static,
    {
        let device_channels = self.config.channels as usize;
        let error_flag = Arc::clone(&self.error_flag);
        let error_count = Arc::clone(&self.error_count);
        let mut scratch = vec![0.0f32; SCRATCH_FRAMES * CHANNELS];

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    fill_device_buffer(&mut source, &mut scratch, data, device_channels, convert);
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                    error_count.fetch_add(1, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    /// Stop audio playback and drop the stream.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            info!("Stopping audio stream");
            stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
        }
        Ok(())
    }

    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown".to_string())
    }

    /// Sample rate the device is actually running at
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// True once the stream error callback has fired
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Fill one device buffer from `source`, a scratch-sized chunk at a time.
///
/// Never allocates: buffers larger than `scratch` are rendered in several
/// pulls. Short reads are padded with silence.
fn fill_device_buffer<T: SizedSample, S: SampleStream>(
    source: &mut S,
    scratch: &mut [f32],
    data: &mut [T],
    device_channels: usize,
    convert: fn(f32) -> T,
) {
    let device_channels = device_channels.max(1);
    let chunk_frames = (scratch.len() / CHANNELS).max(1);

    for chunk in data.chunks_mut(chunk_frames * device_channels) {
        let frames = chunk.len() / device_channels;
        let stereo = &mut scratch[..frames * CHANNELS];
        let written = source.read(stereo).min(stereo.len());
        stereo[written..].fill(0.0);
        map_channels(stereo, chunk, device_channels, convert);
    }
}

/// Copy interleaved stereo into a device buffer with `device_channels`.
///
/// Mono devices get the average of both channels; extra device channels
/// are silent.
fn map_channels<T: SizedSample>(
    stereo: &[f32],
    data: &mut [T],
    device_channels: usize,
    convert: fn(f32) -> T,
) {
    let silence = convert(0.0);
    match device_channels {
        0 => {}
        1 => {
            for (out, frame) in data.iter_mut().zip(stereo.chunks_exact(CHANNELS)) {
                *out = convert(((frame[0] + frame[1]) * 0.5).clamp(-1.0, 1.0));
            }
        }
        n => {
            for (out, frame) in data.chunks_mut(n).zip(stereo.chunks_exact(CHANNELS)) {
                out[0] = convert(frame[0].clamp(-1.0, 1.0));
                out[1] = convert(frame[1].clamp(-1.0, 1.0));
                for extra in &mut out[2..] {
                    *extra = silence;
                }
            }
        }
    }
}

/// Dedicated thread owning the `AudioOutput`
pub struct OutputThread {
    sample_rate: u32,
    device_name: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl OutputThread {
    /// Open the device on a new thread and start pulling from `source`.
    ///
    /// Blocks until the stream is running (or failed to start), so device
    /// errors surface here.
    pub fn spawn<S>(
        device_name: Option<String>,
        preferred_rate: u32,
        buffer_size: Option<u32>,
        source: S,
    ) -> Result<Self>
    where
        S: SampleStream + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, String)>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name("seamless-audio-out".to_string())
            .spawn(move || {
                let mut output =
                    match AudioOutput::new(device_name.as_deref(), preferred_rate, buffer_size) {
                        Ok(output) => output,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                if let Err(e) = output.start(source) {
                    let _ = ready_tx.send(Err(e));
                    return;
                }

                let _ = ready_tx.send(Ok((output.sample_rate(), output.device_name())));

                // Park until shutdown is requested or the engine side is dropped
                let _ = shutdown_rx.recv();

                if output.has_error() {
                    warn!(
                        "Audio output closing after {} stream errors",
                        output.error_count()
                    );
                }
                if let Err(e) = output.stop() {
                    warn!("Failed to stop audio output: {}", e);
                }
                info!("Audio output thread exiting");
            })?;

        let (sample_rate, device_name) = match ready_rx.recv() {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(Error::AudioOutput(
                    "Audio output thread exited during startup".to_string(),
                ));
            }
        };

        info!("Audio output running on '{}' at {}Hz", device_name, sample_rate);

        Ok(Self {
            sample_rate,
            device_name,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Stop the stream and join the thread. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Audio output thread panicked");
            }
        }
    }
}

impl Drop for OutputThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
