//! Playback engine: track registry, mixer bus and output
//!
//! The engine owns every `PlaybackUnit`, the control side of the mixer bus
//! and (unless headless) the audio output thread. A periodic sync task
//! refreshes every unit's position, reclaims retired bus voices and
//! publishes one `StateChanged` event per tick.
//!
//! Commands addressed to an unknown track id are silent no-ops. The only
//! command that can fail is `add_track`, and only after shutdown.

use crate::audio::{DecodedSource, OutputThread};
use crate::error::{Error, Result};
use crate::playback::bus::{BusRenderer, MixerBus, DEFAULT_COMMAND_CAPACITY};
use crate::playback::driver::{spawn_ticker, TickFlow};
use crate::playback::unit::{PlaybackUnit, UnitTiming};
use seamless_common::config::EngineConfig;
use seamless_common::events::{EngineEvent, EventBus};
use seamless_common::track::{TrackId, TrackSnapshot, TrackSource};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Units in insertion order
#[derive(Default)]
struct Registry {
    units: HashMap<TrackId, Arc<PlaybackUnit>>,
    order: Vec<TrackId>,
}

impl Registry {
    fn insert(&mut self, unit: Arc<PlaybackUnit>) {
        let id = unit.id();
        if self.units.insert(id, unit).is_none() {
            self.order.push(id);
        }
    }

    fn remove(&mut self, id: TrackId) -> Option<Arc<PlaybackUnit>> {
        let unit = self.units.remove(&id)?;
        self.order.retain(|other| *other != id);
        Some(unit)
    }

    fn ordered(&self) -> Vec<Arc<PlaybackUnit>> {
        self.order
            .iter()
            .filter_map(|id| self.units.get(id).cloned())
            .collect()
    }

    fn drain(&mut self) -> Vec<Arc<PlaybackUnit>> {
        let units = self.ordered();
        self.units.clear();
        self.order.clear();
        units
    }
}

/// Multi-track playback engine
pub struct Engine {
    config: EngineConfig,
    timing: UnitTiming,
    working_rate: u32,
    runtime: Handle,
    bus: MixerBus,
    registry: Mutex<Registry>,
    events: EventBus,
    shut_down: AtomicBool,
    sync_task: Mutex<Option<JoinHandle<()>>>,
    output: Mutex<Option<OutputThread>>,
}

impl Engine {
    /// Open the audio output and start the engine.
    ///
    /// Must be called from within a tokio runtime. The working sample rate
    /// is whatever the device actually runs at.
    pub fn start(config: EngineConfig) -> Result<Arc<Self>> {
        let runtime = current_runtime()?;
        let (bus, renderer) = MixerBus::new(DEFAULT_COMMAND_CAPACITY);

        let output = OutputThread::spawn(
            config.audio.device.clone(),
            config.audio.sample_rate,
            config.audio.buffer_size,
            renderer,
        )?;
        let working_rate = output.sample_rate();
        if working_rate != config.audio.sample_rate {
            info!(
                "Working sample rate set to {}Hz (device does not offer {}Hz)",
                working_rate, config.audio.sample_rate
            );
        }

        let engine = Self::assemble(config, working_rate, runtime, bus, Some(output));
        info!("Engine started at {}Hz", working_rate);
        Ok(engine)
    }

    /// Start the engine without an audio device.
    ///
    /// The caller drives rendering by pulling from the returned
    /// `BusRenderer`. Used by tests and offline rendering.
    pub fn headless(config: EngineConfig) -> Result<(Arc<Self>, BusRenderer)> {
        let runtime = current_runtime()?;
        let (bus, renderer) = MixerBus::new(DEFAULT_COMMAND_CAPACITY);
        let working_rate = config.audio.sample_rate;

        let engine = Self::assemble(config, working_rate, runtime, bus, None);
        info!("Engine started headless at {}Hz", working_rate);
        Ok((engine, renderer))
    }

    fn assemble(
        config: EngineConfig,
        working_rate: u32,
        runtime: Handle,
        bus: MixerBus,
        output: Option<OutputThread>,
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            timing: UnitTiming::from(&config.timing),
            events: EventBus::new(config.events.capacity),
            working_rate,
            runtime,
            bus,
            registry: Mutex::new(Registry::default()),
            shut_down: AtomicBool::new(false),
            sync_task: Mutex::new(None),
            output: Mutex::new(output),
            config,
        });

        let sync = spawn_ticker(
            &engine.runtime,
            engine.config.timing.sync_tick(),
            Arc::downgrade(&engine),
            |engine: &Engine| {
                if engine.is_shut_down() {
                    return TickFlow::Stop;
                }
                engine.sync();
                TickFlow::Continue
            },
        );
        *lock(&engine.sync_task) = Some(sync);
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Sample rate every track is converted to
    pub fn working_sample_rate(&self) -> u32 {
        self.working_rate
    }

    /// Name of the output device, `None` when headless or shut down
    pub fn output_device(&self) -> Option<String> {
        lock(&self.output)
            .as_ref()
            .map(|output| output.device_name().to_string())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Decode `path` and register it as a new track.
    ///
    /// A file that is missing or cannot be decoded still becomes a track,
    /// in the degraded state. Fails only when the engine is shut down.
    pub async fn add_track(
        &self,
        path: impl AsRef<Path>,
        name: Option<String>,
    ) -> Result<TrackId> {
        self.ensure_running()?;

        let path: PathBuf = path.as_ref().to_path_buf();
        let name = name.unwrap_or_else(|| TrackSource::name_from_path(&path));
        let track = TrackSource::new(name, path.clone());

        let opened = if path.exists() {
            let rate = self.working_rate;
            let decode_path = path.clone();
            match tokio::task::spawn_blocking(move || DecodedSource::open(&decode_path, rate)).await
            {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(format!("decoder task failed: {}", e)),
            }
        } else {
            Err(format!("file not found: {}", path.display()))
        };

        // The engine may have gone away while we were decoding
        self.ensure_running()?;

        let id = match opened {
            Ok(source) => self.register_source(track, source),
            Err(reason) => self.register_degraded(track, reason),
        };
        self.notify();
        Ok(id)
    }

    /// Register an already decoded source as a new track.
    ///
    /// The source is resampled if it is not at the working rate.
    pub fn add_decoded_track(
        &self,
        name: impl Into<String>,
        source: DecodedSource,
    ) -> Result<TrackId> {
        self.ensure_running()?;
        let name = name.into();
        let track = TrackSource::new(name.clone(), PathBuf::from(format!("memory:{}", name)));

        let id = match source.into_rate(self.working_rate) {
            Ok(source) => self.register_source(track, source),
            Err(e) => self.register_degraded(track, e.to_string()),
        };
        self.notify();
        Ok(id)
    }

    fn register_source(&self, track: TrackSource, source: DecodedSource) -> TrackId {
        let (unit, voice) = PlaybackUnit::open(track, source, self.timing, self.runtime.clone());
        let id = unit.id();

        if let Err(e) = self.bus.attach(id, voice) {
            unit.dispose();
            let track = unit.snapshot().track;
            return self.register_degraded(track, e.to_string());
        }

        let snapshot = unit.snapshot();
        lock(&self.registry).insert(unit);
        info!(
            "Added track '{}' ({}, {:.1}s)",
            snapshot.track.name, id, snapshot.state.duration
        );
        id
    }

    fn register_degraded(&self, track: TrackSource, reason: String) -> TrackId {
        let id = track.id;
        warn!(
            "Track '{}' could not be opened, adding it inert: {}",
            track.name, reason
        );
        let unit = PlaybackUnit::degraded(track, self.timing, self.runtime.clone());
        lock(&self.registry).insert(unit);
        self.events.emit_lossy(EngineEvent::TrackDegraded {
            track_id: id,
            reason,
        });
        id
    }

    /// Remove a track. Removing an unknown id does nothing.
    pub fn remove_track(&self, id: TrackId) {
        let Some(unit) = lock(&self.registry).remove(id) else {
            return;
        };
        self.retire(&unit);
        info!("Removed track {}", id);
        self.notify();
    }

    /// Remove every track.
    pub fn clear(&self) {
        let units = lock(&self.registry).drain();
        if units.is_empty() {
            return;
        }
        for unit in &units {
            self.retire(unit);
        }
        info!("Cleared {} tracks", units.len());
        self.notify();
    }

    fn retire(&self, unit: &PlaybackUnit) {
        self.bus.detach(unit.id());
        unit.dispose();
    }

    pub fn get_track(&self, id: TrackId) -> Option<TrackSnapshot> {
        self.unit(id).map(|unit| unit.snapshot())
    }

    /// Snapshots of every track in insertion order
    pub fn list_tracks(&self) -> Vec<TrackSnapshot> {
        self.units().iter().map(|unit| unit.snapshot()).collect()
    }

    pub fn track_count(&self) -> usize {
        lock(&self.registry).units.len()
    }

    /// Direct access to a track's unit
    pub fn unit(&self, id: TrackId) -> Option<Arc<PlaybackUnit>> {
        lock(&self.registry).units.get(&id).cloned()
    }

    fn units(&self) -> Vec<Arc<PlaybackUnit>> {
        lock(&self.registry).ordered()
    }

    /// Apply `command` to one track and notify; unknown ids are ignored.
    fn with_unit(&self, id: TrackId, command: impl FnOnce(&PlaybackUnit)) {
        if let Some(unit) = self.unit(id) {
            command(unit.as_ref());
            self.notify();
        } else {
            trace!("Ignoring command for unknown track {}", id);
        }
    }

    /// Apply `command` to every track and notify once.
    fn for_each_unit(&self, command: impl Fn(&PlaybackUnit)) {
        for unit in self.units() {
            command(unit.as_ref());
        }
        self.notify();
    }

    pub fn play(&self, id: TrackId) {
        self.with_unit(id, PlaybackUnit::play);
    }

    pub fn pause(&self, id: TrackId) {
        self.with_unit(id, PlaybackUnit::pause);
    }

    pub fn stop(&self, id: TrackId) {
        self.with_unit(id, PlaybackUnit::stop);
    }

    pub fn toggle(&self, id: TrackId) {
        self.with_unit(id, PlaybackUnit::toggle);
    }

    pub fn set_volume(&self, id: TrackId, volume: f32) {
        self.with_unit(id, |unit| unit.set_volume(volume));
    }

    pub fn fade_to(&self, id: TrackId, target: f32, duration_secs: f64) {
        self.with_unit(id, |unit| unit.fade_to(target, duration_secs));
    }

    pub fn seek(&self, id: TrackId, seconds: f64) {
        self.with_unit(id, |unit| unit.seek(seconds));
    }

    pub fn set_loop_active(&self, id: TrackId, active: bool) {
        self.with_unit(id, |unit| unit.set_loop_active(active));
    }

    pub fn set_loop_start(&self, id: TrackId, seconds: f64) {
        self.with_unit(id, |unit| unit.set_loop_start(seconds));
    }

    pub fn set_loop_end(&self, id: TrackId, seconds: f64) {
        self.with_unit(id, |unit| unit.set_loop_end(seconds));
    }

    pub fn mark_loop_start(&self, id: TrackId) {
        self.with_unit(id, PlaybackUnit::mark_loop_start);
    }

    pub fn mark_loop_end(&self, id: TrackId) {
        self.with_unit(id, PlaybackUnit::mark_loop_end);
    }

    pub fn set_notes(&self, id: TrackId, notes: impl Into<String>) {
        let notes = notes.into();
        self.with_unit(id, move |unit| unit.set_notes(notes));
    }

    pub fn play_all(&self) {
        self.for_each_unit(PlaybackUnit::play);
    }

    pub fn pause_all(&self) {
        self.for_each_unit(PlaybackUnit::pause);
    }

    pub fn stop_all(&self) {
        self.for_each_unit(PlaybackUnit::stop);
    }

    pub fn fade_all_to(&self, target: f32, duration_secs: f64) {
        self.for_each_unit(|unit| unit.fade_to(target, duration_secs));
    }

    /// Fade every track to full volume over the default fade length.
    pub fn fade_in_all(&self) {
        self.fade_all_to(1.0, self.config.timing.default_fade_secs);
    }

    /// Fade every track to silence over the default fade length.
    pub fn fade_out_all(&self) {
        self.fade_all_to(0.0, self.config.timing.default_fade_secs);
    }

    /// Bring one track forward: it fades to full volume (starting playback
    /// if needed) while every other track fades to silence.
    ///
    /// `duration_secs` defaults to the configured fade length. Focusing an
    /// id that is not registered fades every track out.
    pub fn focus_track(&self, id: TrackId, duration_secs: Option<f64>) {
        let units = self.units();
        let duration = duration_secs.unwrap_or(self.config.timing.default_fade_secs);

        for unit in &units {
            if unit.id() == id {
                unit.play();
                unit.fade_to(1.0, duration);
            } else {
                unit.fade_to(0.0, duration);
            }
        }
        debug!("Focused track {} over {:.2}s", id, duration);
        self.notify();
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.bus.set_master_volume(volume);
        debug!("Master volume set to {:.2}", self.bus.master_volume());
        self.notify();
    }

    pub fn master_volume(&self) -> f32 {
        self.bus.master_volume()
    }

    /// One synchronization tick.
    pub fn sync(&self) {
        for unit in self.units() {
            unit.update_current_time();
        }
        self.bus.reclaim();
        self.notify();
    }

    /// Stop the sync task, dispose every track and release the output.
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down engine");

        if let Some(task) = lock(&self.sync_task).take() {
            task.abort();
        }

        for unit in lock(&self.registry).drain() {
            self.retire(&unit);
        }
        self.bus.detach_all();

        if let Some(mut output) = lock(&self.output).take() {
            output.shutdown();
        }
        self.bus.reclaim();
        self.notify();
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(Error::EngineShutdown)
        } else {
            Ok(())
        }
    }

    fn notify(&self) {
        self.events.emit_lossy(EngineEvent::StateChanged);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn current_runtime() -> Result<Handle> {
    Handle::try_current()
        .map_err(|e| Error::AudioOutput(format!("Engine needs a tokio runtime: {}", e)))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
