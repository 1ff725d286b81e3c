//! Error types for seamless-player
//!
//! Transport commands never fail: bad input is clamped and unknown tracks
//! are ignored. Errors exist only where real I/O happens: opening a source,
//! resampling it, and talking to the output device.

use thiserror::Error;

/// Main error type for the player
#[derive(Error, Debug)]
pub enum Error {
    /// Audio file could not be opened or decoded
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Sample rate conversion failed
    #[error("Resample error: {0}")]
    Resample(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Mixer bus topology change could not be queued
    #[error("Mixer bus error: {0}")]
    Bus(String),

    /// The engine has been shut down
    #[error("Engine is shut down")]
    EngineShutdown,

    /// File I/O error
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration and other shared errors
    #[error(transparent)]
    Common(#[from] seamless_common::Error),
}

/// Convenience Result type using the player Error
pub type Result<T> = std::result::Result<T, Error>;
