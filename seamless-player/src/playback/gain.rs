//! Per-track gain stage
//!
//! The control side changes gain through a `GainHandle`; the rendering side
//! reads it once per pull. No locks on either side.

use crate::audio::SampleStream;
use portable_atomic::AtomicF32;
use seamless_common::track::clamp_volume;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Scales an upstream stream by a runtime-adjustable factor
pub struct GainStage<S> {
    inner: S,
    gain: Arc<AtomicF32>,
}

/// Control-side handle to a `GainStage`
#[derive(Debug, Clone)]
pub struct GainHandle {
    gain: Arc<AtomicF32>,
}

impl<S: SampleStream> GainStage<S> {
    /// Wrap `inner` with an initial gain (clamped to [0.0, 1.0]).
    pub fn new(inner: S, gain: f32) -> (Self, GainHandle) {
        let gain = Arc::new(AtomicF32::new(clamp_volume(gain)));
        let handle = GainHandle {
            gain: Arc::clone(&gain),
        };
        (Self { inner, gain }, handle)
    }
}

impl<S: SampleStream> SampleStream for GainStage<S> {
    fn read(&mut self, out: &mut [f32]) -> usize {
        let written = self.inner.read(out);
        let gain = self.gain.load(Ordering::Relaxed);
        if gain != 1.0 {
            for sample in &mut out[..written] {
                *sample *= gain;
            }
        }
        written
    }
}

impl GainHandle {
    pub fn set(&self, gain: f32) {
        self.gain.store(clamp_volume(gain), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        self.gain.load(Ordering::Relaxed)
    }
}
