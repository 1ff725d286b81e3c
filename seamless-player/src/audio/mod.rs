//! Audio I/O: decoding, resampling, in-memory sources and device output

pub mod decoder;
pub mod output;
pub mod resampler;
pub mod source;
pub mod types;

pub use decoder::{DecodedAudio, SimpleDecoder};
pub use output::{AudioOutput, OutputThread};
pub use resampler::Resampler;
pub use source::{DecodedSource, SourceReader};
pub use types::{ConstantStream, SampleStream, CHANNELS};
