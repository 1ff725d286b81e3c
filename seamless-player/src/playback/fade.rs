//! Linear volume fade envelope
//!
//! Progress is computed from measured elapsed time rather than tick counts,
//! so a late or skipped tick never stretches the fade.

use seamless_common::track::clamp_volume;
use std::time::Duration;
use tokio::time::Instant;

/// One in-flight fade from `from` to `to` over `duration`
#[derive(Debug, Clone, Copy)]
pub struct FadeEnvelope {
    from: f32,
    to: f32,
    duration: Duration,
    started: Instant,
}

/// Envelope value at a point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeSample {
    pub volume: f32,
    pub finished: bool,
}

impl FadeEnvelope {
    /// Start a fade now. Volumes are clamped to [0.0, 1.0]; the duration is
    /// floored at `min_secs` (NaN counts as zero).
    pub fn start(from: f32, to: f32, duration_secs: f64, min_secs: f64) -> Self {
        Self::starting_at(from, to, duration_secs, min_secs, Instant::now())
    }

    pub fn starting_at(
        from: f32,
        to: f32,
        duration_secs: f64,
        min_secs: f64,
        started: Instant,
    ) -> Self {
        let secs = if duration_secs.is_finite() {
            duration_secs.max(min_secs)
        } else if duration_secs == f64::INFINITY {
            f64::from(u32::MAX)
        } else {
            min_secs
        };
        Self {
            from: clamp_volume(from),
            to: clamp_volume(to),
            duration: Duration::from_secs_f64(secs.max(0.0)),
            started,
        }
    }

    pub fn target(&self) -> f32 {
        self.to
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Fraction of the fade completed at `now`, in [0.0, 1.0]
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    /// Volume at `now`; exactly the target once the fade has finished.
    pub fn sample(&self, now: Instant) -> FadeSample {
        let progress = self.progress(now);
        if progress >= 1.0 {
            return FadeSample {
                volume: self.to,
                finished: true,
            };
        }
        let volume = self.from + (self.to - self.from) * progress as f32;
        FadeSample {
            volume: clamp_volume(volume),
            finished: false,
        }
    }
}
