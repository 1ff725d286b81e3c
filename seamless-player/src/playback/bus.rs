//! Mixer bus
//!
//! The bus is split in two halves:
//! - `MixerBus` lives on the control side. It queues topology changes
//!   (attach/detach) and owns the master gain.
//! - `BusRenderer` lives on the rendering thread. It owns the attached
//!   voices, applies queued changes at the start of every pull, sums the
//!   voices and applies master gain.
//!
//! Changes travel through a lock-free SPSC ring. Detached voices travel back
//! through a second ring so that their buffers are freed on the control
//! side, not in the audio callback. Rendering never allocates or frees:
//! large pulls are mixed in scratch-sized chunks, and a voice that finds the
//! retire ring full is parked until the next pull.

use crate::audio::SampleStream;
use crate::error::{Error, Result};
use portable_atomic::AtomicF32;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use seamless_common::track::{clamp_volume, TrackId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

/// Capacity of the command and retire rings
pub const DEFAULT_COMMAND_CAPACITY: usize = 1024;

/// Samples pre-allocated for per-voice rendering
const SCRATCH_SAMPLES: usize = 8192;

type Voice = Box<dyn SampleStream>;

enum BusCommand {
    Attach(TrackId, Voice),
    Detach(TrackId),
}

struct BusControl {
    commands: HeapProd<BusCommand>,
    retired: HeapCons<Voice>,
    attached: HashSet<TrackId>,
}

/// Control side of the mixer bus
pub struct MixerBus {
    control: Mutex<BusControl>,
    master: Arc<AtomicF32>,
    retire_overflows: Arc<AtomicUsize>,
}

/// Rendering side of the mixer bus
pub struct BusRenderer {
    commands: HeapCons<BusCommand>,
    retired: HeapProd<Voice>,
    voices: Vec<(TrackId, Voice)>,
    /// Detached voices waiting for room in the retire ring
    parked: Vec<Voice>,
    scratch: Vec<f32>,
    master: Arc<AtomicF32>,
    retire_overflows: Arc<AtomicUsize>,
}

impl MixerBus {
    /// Create a connected bus/renderer pair.
    pub fn new(capacity: usize) -> (Self, BusRenderer) {
        Self::with_capacities(capacity, capacity)
    }

    fn with_capacities(commands: usize, retired: usize) -> (Self, BusRenderer) {
        let commands = commands.max(1);
        let (command_tx, command_rx) = HeapRb::<BusCommand>::new(commands).split();
        let (retired_tx, retired_rx) = HeapRb::<Voice>::new(retired.max(1)).split();
        let master = Arc::new(AtomicF32::new(1.0));
        let retire_overflows = Arc::new(AtomicUsize::new(0));

        let bus = Self {
            control: Mutex::new(BusControl {
                commands: command_tx,
                retired: retired_rx,
                attached: HashSet::new(),
            }),
            master: Arc::clone(&master),
            retire_overflows: Arc::clone(&retire_overflows),
        };
        let renderer = BusRenderer {
            commands: command_rx,
            retired: retired_tx,
            voices: Vec::with_capacity(commands),
            parked: Vec::with_capacity(commands),
            scratch: vec![0.0; SCRATCH_SAMPLES],
            master,
            retire_overflows,
        };
        (bus, renderer)
    }

    /// Attach a voice under `id`.
    ///
    /// Attaching an id that is already on the bus is a no-op.
    pub fn attach(&self, id: TrackId, voice: Box<dyn SampleStream>) -> Result<()> {
        let mut control = self.lock();
        Self::drain_retired(&mut control);

        if control.attached.contains(&id) {
            return Ok(());
        }
        if control.commands.try_push(BusCommand::Attach(id, voice)).is_err() {
            return Err(Error::Bus(format!(
                "command queue full, cannot attach track {}",
                id
            )));
        }
        control.attached.insert(id);
        debug!("Attached track {} to mixer bus", id);
        Ok(())
    }

    /// Detach the voice registered under `id`.
    ///
    /// Returns false when nothing was attached under that id.
    pub fn detach(&self, id: TrackId) -> bool {
        let mut control = self.lock();
        Self::drain_retired(&mut control);

        if !control.attached.remove(&id) {
            return false;
        }
        if control.commands.try_push(BusCommand::Detach(id)).is_err() {
            warn!("Mixer bus command queue full, track {} stays attached", id);
            control.attached.insert(id);
            return false;
        }
        debug!("Detached track {} from mixer bus", id);
        true
    }

    /// Detach every voice.
    pub fn detach_all(&self) {
        let ids: Vec<TrackId> = self.lock().attached.iter().copied().collect();
        for id in ids {
            self.detach(id);
        }
    }

    pub fn is_attached(&self, id: TrackId) -> bool {
        self.lock().attached.contains(&id)
    }

    pub fn attached_count(&self) -> usize {
        self.lock().attached.len()
    }

    /// Drop voices the renderer has retired. Returns how many were freed.
    pub fn reclaim(&self) -> usize {
        let overflows = self.retire_overflows.swap(0, Ordering::Relaxed);
        if overflows > 0 {
            warn!(
                "Mixer bus retire ring was full {} times, voices parked on the render side",
                overflows
            );
        }
        Self::drain_retired(&mut self.lock())
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.master.store(clamp_volume(volume), Ordering::Relaxed);
    }

    pub fn master_volume(&self) -> f32 {
        self.master.load(Ordering::Relaxed)
    }

    fn drain_retired(control: &mut BusControl) -> usize {
        let mut freed = 0;
        while control.retired.try_pop().is_some() {
            freed += 1;
        }
        if freed > 0 {
            trace!("Reclaimed {} retired voices", freed);
        }
        freed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusControl> {
        // A panic while holding the lock leaves the sets consistent
        self.control.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BusRenderer {
    /// Number of voices currently mixed
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    fn apply_commands(&mut self) {
        self.retry_parked();
        while let Some(command) = self.commands.try_pop() {
            match command {
                BusCommand::Attach(id, voice) => self.voices.push((id, voice)),
                BusCommand::Detach(id) => {
                    if let Some(index) = self.voices.iter().position(|(v, _)| *v == id) {
                        let (_, voice) = self.voices.swap_remove(index);
                        if let Err(voice) = self.retired.try_push(voice) {
                            self.retire_overflows.fetch_add(1, Ordering::Relaxed);
                            self.parked.push(voice);
                        }
                    }
                }
            }
        }
    }

    fn retry_parked(&mut self) {
        while let Some(voice) = self.parked.pop() {
            if let Err(voice) = self.retired.try_push(voice) {
                self.parked.push(voice);
                break;
            }
        }
    }
}

impl SampleStream for BusRenderer {
    /// Mix every voice into `out`. Always fills the whole buffer.
    fn read(&mut self, out: &mut [f32]) -> usize {
        self.apply_commands();

        out.fill(0.0);
        let master = self.master.load(Ordering::Relaxed);

        for chunk in out.chunks_mut(self.scratch.len()) {
            let len = chunk.len();
            for (_, voice) in &mut self.voices {
                let scratch = &mut self.scratch[..len];
                let written = voice.read(scratch).min(len);
                // Samples past `written` count as silence
                for (mixed, sample) in chunk.iter_mut().zip(&scratch[..written]) {
                    *mixed += *sample;
                }
            }
            for sample in chunk.iter_mut() {
                *sample = (*sample * master).clamp(-1.0, 1.0);
            }
        }
        out.len()
    }
}
