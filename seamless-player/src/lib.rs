//! # Seamless Shift Player Library
//!
//! Multi-track mixing engine: every track is decoded once, scaled by its own
//! gain stage and switched in or out of a shared mixer bus by a sample gate.
//! Fades, loop regions and the "focus" crossfade are driven by periodic
//! ticks on the tokio runtime; the audio callback only reads atomics.
//!
//! **Architecture:** symphonia + rubato decode into memory, a lock-free
//! bus renders to a cpal output stream.

pub mod audio;
pub mod error;
pub mod playback;
pub mod shell;

pub use error::{Error, Result};
pub use playback::engine::Engine;
pub use playback::bus::BusRenderer;
pub use playback::unit::PlaybackUnit;
