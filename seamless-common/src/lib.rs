//! # Seamless Shift Common Library
//!
//! Shared code for the Seamless Shift mixing engine and its front ends:
//! - Track and playback state models
//! - Event types and the broadcast EventBus
//! - Configuration loading
//! - Time conversion and display helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;
pub mod track;

pub use error::{Error, Result};
pub use events::{EngineEvent, EventBus};
pub use track::{LoopRegion, PlaybackState, TrackId, TrackSnapshot, TrackSource};
