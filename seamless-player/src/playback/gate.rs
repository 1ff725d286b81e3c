//! Sample gate: the play/pause switch between a track and the bus
//!
//! A closed gate answers every pull with silence of the requested length and
//! does not read upstream, so a paused track keeps its position. An open gate
//! forwards the pull unchanged.

use crate::audio::SampleStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct SampleGate<S> {
    inner: S,
    open: Arc<AtomicBool>,
}

/// Control-side handle to a `SampleGate`
#[derive(Debug, Clone)]
pub struct GateHandle {
    open: Arc<AtomicBool>,
}

impl<S: SampleStream> SampleGate<S> {
    /// Wrap `inner`; the gate starts closed.
    pub fn new(inner: S) -> (Self, GateHandle) {
        let open = Arc::new(AtomicBool::new(false));
        let handle = GateHandle {
            open: Arc::clone(&open),
        };
        (Self { inner, open }, handle)
    }
}

impl<S: SampleStream> SampleStream for SampleGate<S> {
    fn read(&mut self, out: &mut [f32]) -> usize {
        if self.open.load(Ordering::Acquire) {
            self.inner.read(out)
        } else {
            out.fill(0.0);
            out.len()
        }
    }
}

impl GateHandle {
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ConstantStream, DecodedSource};

    #[test]
    fn test_closed_gate_is_silent_and_full_length() {
        let (mut gate, handle) = SampleGate::new(ConstantStream::new(0.7));
        assert!(!handle.is_open());

        let mut out = [1.0; 32];
        assert_eq!(gate.read(&mut out), 32);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_open_gate_passes_through() {
        let (mut gate, handle) = SampleGate::new(ConstantStream::new(0.7));
        handle.set_open(true);

        let mut out = [0.0; 8];
        assert_eq!(gate.read(&mut out), 8);
        assert_eq!(out, [0.7; 8]);
    }

    #[test]
    fn test_open_gate_returns_upstream_count() {
        // 3 frames available, ask for 4
        let source = DecodedSource::from_samples(vec![0.1; 6], 100);
        let (mut gate, handle) = SampleGate::new(source.reader());
        handle.set_open(true);

        let mut out = [0.0; 8];
        assert_eq!(gate.read(&mut out), 6);
    }

    #[test]
    fn test_closed_gate_does_not_advance_source() {
        let source = DecodedSource::from_samples(vec![0.1; 200], 100);
        let (mut gate, _handle) = SampleGate::new(source.reader());

        let mut out = [0.0; 20];
        gate.read(&mut out);
        assert_eq!(source.position(), 0.0);
    }
}
