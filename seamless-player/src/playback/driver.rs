//! Periodic tick drivers
//!
//! Fades, loop monitors and the registry sync all run as tokio interval
//! tasks. A driver only holds a `Weak` reference to its target, so a
//! dropped unit or engine ends the task on its next tick.

use std::sync::Weak;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// What a tick callback wants to happen next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

/// Spawn a task calling `tick` every `period` until it returns
/// `TickFlow::Stop` or `target` is gone. The first call happens one
/// period after spawning.
pub fn spawn_ticker<T, F>(
    runtime: &Handle,
    period: Duration,
    target: Weak<T>,
    mut tick: F,
) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
    F: FnMut(&T) -> TickFlow + Send + 'static,
{
    runtime.spawn(async move {
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let Some(target) = target.upgrade() else {
                break;
            };
            if tick(&target) == TickFlow::Stop {
                break;
            }
        }
    })
}
