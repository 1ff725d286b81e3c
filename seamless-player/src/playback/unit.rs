//! Playback unit: one track's transport, volume, fade and loop control
//!
//! A unit owns the control side of its audio chain
//! (`DecodedSource` -> `GainStage` -> `SampleGate`); the render side of the
//! chain sits on the mixer bus. Pausing closes the gate, it never detaches
//! the chain.
//!
//! All mutable state lives behind one mutex that is held for the whole of
//! each operation, including the fade and monitor ticks. Ticks carry a
//! generation number: a tick whose generation is stale exits without
//! touching anything, so replacing a fade or restarting the monitor can
//! never produce a double advance.
//!
//! A unit whose source failed to open is *degraded*: it still has a track
//! description and notes, but every transport and loop operation is a
//! no-op. A disposed unit ignores everything.

use crate::audio::{DecodedSource, SampleStream};
use crate::playback::driver::{spawn_ticker, TickFlow};
use crate::playback::fade::FadeEnvelope;
use crate::playback::gain::{GainHandle, GainStage};
use crate::playback::gate::{GateHandle, SampleGate};
use seamless_common::config::TimingConfig;
use seamless_common::track::{
    clamp_seconds, clamp_volume, PlaybackState, TrackId, TrackSnapshot, TrackSource,
};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Timing parameters shared by every unit of an engine
#[derive(Debug, Clone, Copy)]
pub struct UnitTiming {
    pub fade_tick: Duration,
    pub monitor_tick: Duration,
    /// Distance from the end of a track treated as "ended"; also the
    /// rewind threshold for `play`
    pub end_tolerance: f64,
    pub min_fade: f64,
}

impl Default for UnitTiming {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

impl From<&TimingConfig> for UnitTiming {
    fn from(config: &TimingConfig) -> Self {
        Self {
            fade_tick: config.fade_tick(),
            monitor_tick: config.monitor_tick(),
            end_tolerance: config.end_tolerance_secs,
            min_fade: config.min_fade_secs,
        }
    }
}

/// Control-side handles of the audio chain
struct Chain {
    source: DecodedSource,
    gain: GainHandle,
    gate: GateHandle,
}

struct ActiveFade {
    envelope: FadeEnvelope,
    generation: u64,
}

struct UnitInner {
    track: TrackSource,
    state: PlaybackState,
    chain: Option<Chain>,
    disposed: bool,

    fade: Option<ActiveFade>,
    fade_generation: u64,
    fade_task: Option<JoinHandle<()>>,

    monitor_generation: u64,
    monitor_task: Option<JoinHandle<()>>,
}

/// One track of the mixer
pub struct PlaybackUnit {
    id: TrackId,
    inner: Mutex<UnitInner>,
    timing: UnitTiming,
    runtime: Handle,
    this: Weak<PlaybackUnit>,
}

impl PlaybackUnit {
    /// Build a unit around an opened source.
    ///
    /// Returns the unit and the render side of its chain, ready to attach
    /// to the mixer bus. The gate starts closed and the gain matches the
    /// initial volume. The loop end is set to the track duration so that
    /// activating the loop repeats the whole track.
    pub fn open(
        track: TrackSource,
        source: DecodedSource,
        timing: UnitTiming,
        runtime: Handle,
    ) -> (Arc<Self>, Box<dyn SampleStream>) {
        let mut state = PlaybackState::default();
        state.duration = source.duration();
        state.loop_region.end = state.duration;

        let (gain_stage, gain) = GainStage::new(source.reader(), state.volume);
        let (gate_stage, gate) = SampleGate::new(gain_stage);

        let chain = Chain { source, gain, gate };
        let unit = Self::build(track, state, Some(chain), timing, runtime);
        (unit, Box::new(gate_stage))
    }

    /// Build an inert unit for a track whose source could not be opened.
    pub fn degraded(track: TrackSource, timing: UnitTiming, runtime: Handle) -> Arc<Self> {
        Self::build(track, PlaybackState::default(), None, timing, runtime)
    }

    fn build(
        track: TrackSource,
        state: PlaybackState,
        chain: Option<Chain>,
        timing: UnitTiming,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: track.id,
            inner: Mutex::new(UnitInner {
                track,
                state,
                chain,
                disposed: false,
                fade: None,
                fade_generation: 0,
                fade_task: None,
                monitor_generation: 0,
                monitor_task: None,
            }),
            timing,
            runtime,
            this: this.clone(),
        })
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn is_degraded(&self) -> bool {
        self.lock().chain.is_none()
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        let inner = self.lock();
        TrackSnapshot {
            track: inner.track.clone(),
            state: inner.state,
            degraded: inner.chain.is_none(),
        }
    }

    /// Start playback.
    ///
    /// A track sitting at its end is rewound first. No-op when already
    /// playing.
    pub fn play(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.disposed || inner.state.playing {
            return;
        }
        let Some(chain) = inner.chain.as_ref() else {
            return;
        };

        let mut position = chain.source.position();
        if inner.state.duration - position <= self.timing.end_tolerance {
            position = chain.source.seek(0.0);
        }
        chain.gate.set_open(true);

        inner.state.position = position;
        inner.state.playing = true;
        self.restart_monitor(inner);
        debug!("Track {} playing from {:.2}s", self.id, position);
    }

    pub fn pause(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.disposed || !inner.state.playing {
            return;
        }
        if let Some(chain) = inner.chain.as_ref() {
            chain.gate.set_open(false);
            inner.state.position = chain.source.position();
        }
        inner.state.playing = false;
        Self::cancel_monitor(inner);
        debug!("Track {} paused at {:.2}s", self.id, inner.state.position);
    }

    /// Stop playback and rewind to the start.
    pub fn stop(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.disposed {
            return;
        }
        let Some(chain) = inner.chain.as_ref() else {
            return;
        };
        chain.gate.set_open(false);
        chain.source.seek(0.0);

        inner.state.playing = false;
        inner.state.position = 0.0;
        Self::cancel_monitor(inner);
        debug!("Track {} stopped", self.id);
    }

    /// Pause when playing, play otherwise.
    pub fn toggle(&self) {
        let playing = self.lock().state.playing;
        if playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Set the volume immediately.
    ///
    /// An in-flight fade keeps running and overrides this on its next tick.
    pub fn set_volume(&self, volume: f32) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.disposed {
            return;
        }
        let Some(chain) = inner.chain.as_ref() else {
            return;
        };
        let volume = clamp_volume(volume);
        chain.gain.set(volume);
        inner.state.volume = volume;
    }

    /// Fade linearly from the current volume to `target` over
    /// `duration_secs`, replacing any fade in flight.
    pub fn fade_to(&self, target: f32, duration_secs: f64) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.disposed || inner.chain.is_none() {
            return;
        }

        let envelope = FadeEnvelope::start(
            inner.state.volume,
            target,
            duration_secs,
            self.timing.min_fade,
        );

        Self::cancel_fade(inner);
        inner.fade_generation += 1;
        let generation = inner.fade_generation;
        inner.fade = Some(ActiveFade {
            envelope,
            generation,
        });
        inner.state.fading = true;

        inner.fade_task = Some(spawn_ticker(
            &self.runtime,
            self.timing.fade_tick,
            self.this.clone(),
            move |unit: &PlaybackUnit| unit.fade_tick(generation, Instant::now()),
        ));

        debug!(
            "Track {} fading {:.2} -> {:.2} over {:?}",
            self.id,
            inner.state.volume,
            envelope.target(),
            envelope.duration()
        );
    }

    /// Move the playback position (clamped to the track).
    pub fn seek(&self, seconds: f64) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.disposed {
            return;
        }
        let Some(chain) = inner.chain.as_ref() else {
            return;
        };
        let position = chain.source.seek(clamp_seconds(seconds, inner.state.duration));
        inner.state.position = position;
        trace!("Track {} seek to {:.3}s", self.id, position);
    }

    pub fn set_loop_active(&self, active: bool) {
        self.update_loop(|state| state.loop_region.active = active);
    }

    pub fn set_loop_start(&self, seconds: f64) {
        self.update_loop(|state| {
            state.loop_region.start = clamp_seconds(seconds, state.duration);
        });
    }

    pub fn set_loop_end(&self, seconds: f64) {
        self.update_loop(|state| {
            state.loop_region.end = clamp_seconds(seconds, state.duration);
        });
    }

    /// Set the loop start to the current position.
    pub fn mark_loop_start(&self) {
        self.update_loop(|state| state.loop_region.start = state.position);
    }

    /// Set the loop end to the current position.
    pub fn mark_loop_end(&self) {
        self.update_loop(|state| state.loop_region.end = state.position);
    }

    pub fn set_notes(&self, notes: impl Into<String>) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.disposed {
            return;
        }
        inner.track.notes = notes.into();
    }

    /// Refresh the position from the source while playing and stop at the
    /// end of the track unless the loop is active.
    pub fn update_current_time(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.disposed || !inner.state.playing {
            return;
        }
        let Some(position) = inner.chain.as_ref().map(|c| c.source.position()) else {
            return;
        };
        inner.state.position = position;

        if !inner.state.loop_region.active && self.at_end(&inner.state) {
            self.finish_playback(inner);
        }
    }

    /// Stop every driver and silence the unit. Idempotent.
    pub fn dispose(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.disposed {
            return;
        }
        inner.disposed = true;
        Self::cancel_fade(inner);
        Self::cancel_monitor(inner);
        if let Some(chain) = inner.chain.as_ref() {
            chain.gate.set_open(false);
        }
        inner.state.playing = false;
        inner.state.fading = false;
        debug!("Track {} disposed", self.id);
    }

    fn update_loop(&self, apply: impl FnOnce(&mut PlaybackState)) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.disposed || inner.chain.is_none() {
            return;
        }
        if let Some(position) = inner.chain.as_ref().map(|c| c.source.position()) {
            inner.state.position = position;
        }
        apply(&mut inner.state);
    }

    fn fade_tick(&self, generation: u64, now: Instant) -> TickFlow {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.disposed {
            return TickFlow::Stop;
        }
        let sample = match inner.fade.as_ref() {
            Some(fade) if fade.generation == generation => fade.envelope.sample(now),
            _ => return TickFlow::Stop,
        };

        if let Some(chain) = inner.chain.as_ref() {
            chain.gain.set(sample.volume);
        }
        inner.state.volume = sample.volume;

        if sample.finished {
            inner.fade = None;
            inner.fade_task = None;
            inner.state.fading = false;
            trace!("Track {} fade finished at {:.2}", self.id, sample.volume);
            TickFlow::Stop
        } else {
            TickFlow::Continue
        }
    }

    fn monitor_tick(&self, generation: u64) -> TickFlow {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.disposed || !inner.state.playing || inner.monitor_generation != generation {
            return TickFlow::Stop;
        }
        let Some(chain) = inner.chain.as_ref() else {
            return TickFlow::Stop;
        };

        let mut position = chain.source.position();
        let region = inner.state.loop_region;

        if region.active {
            if region.is_bounded() {
                if position >= region.end {
                    position = chain.source.seek(region.start);
                    trace!("Track {} looped to {:.2}s", self.id, position);
                }
            } else if inner.state.duration - position <= self.timing.end_tolerance {
                position = chain.source.seek(0.0);
                trace!("Track {} looped to start", self.id);
            }
            inner.state.position = position;
            return TickFlow::Continue;
        }

        inner.state.position = position;
        if self.at_end(&inner.state) {
            self.finish_playback(inner);
            return TickFlow::Stop;
        }
        TickFlow::Continue
    }

    fn at_end(&self, state: &PlaybackState) -> bool {
        state.duration - state.position <= self.timing.end_tolerance
    }

    /// End-of-track stop: the position stays at the end.
    fn finish_playback(&self, inner: &mut UnitInner) {
        if let Some(chain) = inner.chain.as_ref() {
            chain.gate.set_open(false);
        }
        inner.state.playing = false;
        Self::cancel_monitor(inner);
        debug!("Track {} reached end of track", self.id);
    }

    fn restart_monitor(&self, inner: &mut UnitInner) {
        Self::cancel_monitor(inner);
        let generation = inner.monitor_generation;
        inner.monitor_task = Some(spawn_ticker(
            &self.runtime,
            self.timing.monitor_tick,
            self.this.clone(),
            move |unit: &PlaybackUnit| unit.monitor_tick(generation),
        ));
    }

    /// Invalidate the running monitor, if any.
    fn cancel_monitor(inner: &mut UnitInner) {
        inner.monitor_generation += 1;
        if let Some(task) = inner.monitor_task.take() {
            task.abort();
        }
    }

    fn cancel_fade(inner: &mut UnitInner) {
        inner.fade = None;
        if let Some(task) = inner.fade_task.take() {
            task.abort();
        }
    }

    fn lock(&self) -> MutexGuard<'_, UnitInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for PlaybackUnit {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|p| p.into_inner());
        Self::cancel_fade(inner);
        Self::cancel_monitor(inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::CHANNELS;

    const RATE: u32 = 1000;

    fn silent_unit(seconds: f64) -> (Arc<PlaybackUnit>, Box<dyn SampleStream>) {
        let frames = (seconds * RATE as f64) as usize;
        let source = DecodedSource::from_samples(vec![0.5; frames * CHANNELS], RATE);
        PlaybackUnit::open(
            TrackSource::new("test", "/tmp/test.wav"),
            source,
            UnitTiming::default(),
            Handle::current(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_sets_duration_and_loop_end() {
        let (unit, _voice) = silent_unit(30.0);
        let snapshot = unit.snapshot();
        assert_eq!(snapshot.state.duration, 30.0);
        assert_eq!(snapshot.state.loop_region.end, 30.0);
        assert_eq!(snapshot.state.loop_region.start, 0.0);
        assert_eq!(snapshot.state.volume, 1.0);
        assert!(!snapshot.degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_follows_transport() {
        let (unit, mut voice) = silent_unit(5.0);
        let mut out = [1.0; 8];

        voice.read(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        unit.play();
        voice.read(&mut out);
        assert!(out.iter().all(|&s| s == 0.5));

        unit.pause();
        voice.read(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_reaches_gain() {
        let (unit, mut voice) = silent_unit(5.0);
        unit.play();
        unit.set_volume(0.5);

        let mut out = [0.0; 4];
        voice.read(&mut out);
        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle() {
        let (unit, _voice) = silent_unit(5.0);
        unit.toggle();
        assert!(unit.snapshot().state.playing);
        unit.toggle();
        assert!(!unit.snapshot().state.playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_loop_points_use_position() {
        let (unit, _voice) = silent_unit(30.0);
        unit.seek(12.0);
        unit.mark_loop_start();
        unit.seek(18.5);
        unit.mark_loop_end();

        let region = unit.snapshot().state.loop_region;
        assert_eq!(region.start, 12.0);
        assert_eq!(region.end, 18.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_position_lands_on_a_frame() {
        let (unit, _voice) = silent_unit(30.0);
        unit.seek(12.3456);
        assert_eq!(unit.snapshot().state.position, 12.346);

        // Loop marks re-read the source cursor
        unit.mark_loop_start();
        assert_eq!(unit.snapshot().state.loop_region.start, 12.346);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_unit_keeps_notes() {
        let unit = PlaybackUnit::degraded(
            TrackSource::new("missing", "/nope.mp3"),
            UnitTiming::default(),
            Handle::current(),
        );
        unit.play();
        unit.set_notes("check the path");

        let snapshot = unit.snapshot();
        assert!(snapshot.degraded);
        assert!(!snapshot.state.playing);
        assert_eq!(snapshot.track.notes, "check the path");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_is_idempotent() {
        let (unit, _voice) = silent_unit(5.0);
        unit.play();
        unit.fade_to(0.0, 1.0);
        unit.dispose();
        unit.dispose();

        let state = unit.snapshot().state;
        assert!(unit.is_disposed());
        assert!(!state.playing);
        assert!(!state.fading);
    }
}
