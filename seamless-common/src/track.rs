//! Track and playback state models
//!
//! `TrackSource` describes what a track is (identity, name, file, notes);
//! `PlaybackState` describes what it is doing. Both are owned by the
//! playback unit in the player crate and handed out as `TrackSnapshot`
//! copies so that readers never hold a unit lock.

use crate::time::format_clock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Opaque unique track identity
pub type TrackId = Uuid;

/// Default track volume (full scale)
pub const DEFAULT_VOLUME: f32 = 1.0;

/// Clamp a volume or gain value to [0.0, 1.0].
///
/// NaN is treated as silence so it can never reach a gain stage.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Clamp a time in seconds to [0.0, duration].
pub fn clamp_seconds(seconds: f64, duration: f64) -> f64 {
    if seconds.is_nan() {
        0.0
    } else {
        seconds.clamp(0.0, duration.max(0.0))
    }
}

/// Identity and descriptive data of a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSource {
    /// Unique track id
    pub id: TrackId,

    /// Display name
    pub name: String,

    /// Source audio file
    pub path: PathBuf,

    /// Free-text notes (the only mutable field)
    pub notes: String,
}

impl TrackSource {
    /// Create a track description with a fresh id and empty notes
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            path: path.into(),
            notes: String::new(),
        }
    }

    /// Display name derived from the file name of `path`
    pub fn name_from_path(path: &std::path::Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }
}

/// Loop window in seconds
///
/// The region is *bounded* when `end > start >= 0`. An active loop with an
/// unbounded region repeats the whole track instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopRegion {
    pub active: bool,
    pub start: f64,
    pub end: f64,
}

impl LoopRegion {
    /// True when the region describes a usable [start, end) window
    pub fn is_bounded(&self) -> bool {
        self.end > self.start && self.start >= 0.0
    }
}

/// Mutable playback state of one track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Track volume (0.0-1.0)
    pub volume: f32,

    /// Gate is open and the loop monitor is running
    pub playing: bool,

    /// A fade envelope is in flight
    pub fading: bool,

    /// Track length in seconds (0 for degraded tracks)
    pub duration: f64,

    /// Last observed playback position in seconds
    pub position: f64,

    /// Loop window
    pub loop_region: LoopRegion,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            playing: false,
            fading: false,
            duration: 0.0,
            position: 0.0,
            loop_region: LoopRegion::default(),
        }
    }
}

/// Read-only copy of a track taken under its unit lock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub track: TrackSource,
    pub state: PlaybackState,

    /// The source failed to open; transport controls are inert
    pub degraded: bool,
}

impl TrackSnapshot {
    /// Playback progress in percent (0-100)
    pub fn progress_percent(&self) -> f64 {
        if self.state.duration > 0.0 {
            (self.state.position / self.state.duration * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    /// "mm:ss / mm:ss" position display
    pub fn clock(&self) -> String {
        format!(
            "{} / {}",
            format_clock(self.state.position),
            format_clock(self.state.duration)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_volume() {
        assert_eq!(clamp_volume(1.5), 1.0);
        assert_eq!(clamp_volume(-0.5), 0.0);
        assert_eq!(clamp_volume(0.25), 0.25);
        assert_eq!(clamp_volume(f32::NAN), 0.0);
    }

    #[test]
    fn test_clamp_seconds() {
        assert_eq!(clamp_seconds(-3.0, 30.0), 0.0);
        assert_eq!(clamp_seconds(45.0, 30.0), 30.0);
        assert_eq!(clamp_seconds(12.5, 30.0), 12.5);
        // Degraded tracks have zero duration
        assert_eq!(clamp_seconds(5.0, 0.0), 0.0);
    }

    #[test]
    fn test_loop_region_bounds() {
        let mut region = LoopRegion { active: true, start: 10.0, end: 20.0 };
        assert!(region.is_bounded());

        region.end = 10.0;
        assert!(!region.is_bounded());

        region = LoopRegion { active: true, start: -1.0, end: 5.0 };
        assert!(!region.is_bounded());

        assert!(!LoopRegion::default().is_bounded());
    }

    #[test]
    fn test_default_state() {
        let state = PlaybackState::default();
        assert_eq!(state.volume, 1.0);
        assert!(!state.playing);
        assert!(!state.fading);
        assert_eq!(state.duration, 0.0);
    }

    #[test]
    fn test_snapshot_progress_and_clock() {
        let snapshot = TrackSnapshot {
            track: TrackSource::new("rain", "/music/rain.flac"),
            state: PlaybackState {
                duration: 120.0,
                position: 30.0,
                ..PlaybackState::default()
            },
            degraded: false,
        };
        assert_eq!(snapshot.progress_percent(), 25.0);
        assert_eq!(snapshot.clock(), "00:30 / 02:00");

        let empty = TrackSnapshot {
            state: PlaybackState::default(),
            ..snapshot
        };
        assert_eq!(empty.progress_percent(), 0.0);
    }

    #[test]
    fn test_name_from_path() {
        let name = TrackSource::name_from_path(std::path::Path::new("/music/forest night.ogg"));
        assert_eq!(name, "forest night.ogg");
    }
}
