//! Core audio stream types
//!
//! Everything on the mixer bus speaks one format: interleaved stereo f32 at
//! the engine's working sample rate. Streams are pulled by the rendering
//! thread, so implementations must not block or allocate in `read`.

/// Channel count of the working format
pub const CHANNELS: usize = 2;

/// A pull-based source of interleaved stereo samples.
///
/// `read` fills as much of `out` as it can and returns the number of samples
/// written. Returning fewer than `out.len()` means the stream has nothing
/// more right now; the caller treats the remainder as silence.
pub trait SampleStream: Send {
    fn read(&mut self, out: &mut [f32]) -> usize;
}

impl<S: SampleStream + ?Sized> SampleStream for Box<S> {
    fn read(&mut self, out: &mut [f32]) -> usize {
        (**self).read(out)
    }
}

/// Fill a buffer with a constant value; used by tests and as a signal
/// generator for headless rendering.
#[derive(Debug, Clone, Copy)]
pub struct ConstantStream {
    value: f32,
}

impl ConstantStream {
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl SampleStream for ConstantStream {
    fn read(&mut self, out: &mut [f32]) -> usize {
        out.fill(self.value);
        out.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_stream_fills_request() {
        let mut stream = ConstantStream::new(0.25);
        let mut out = [0.0; 6];
        assert_eq!(stream.read(&mut out), 6);
        assert!(out.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_boxed_stream_forwards() {
        let mut stream: Box<dyn SampleStream> = Box::new(ConstantStream::new(-0.5));
        let mut out = [0.0; 4];
        assert_eq!(stream.read(&mut out), 4);
        assert_eq!(out, [-0.5; 4]);
    }
}
