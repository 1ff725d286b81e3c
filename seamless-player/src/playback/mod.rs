//! Track playback: gain and gate stages, the mixer bus, fades, loop
//! monitoring and the engine that ties them together

pub mod bus;
pub mod driver;
pub mod engine;
pub mod fade;
pub mod gain;
pub mod gate;
pub mod unit;

pub use bus::{BusRenderer, MixerBus};
pub use engine::Engine;
pub use fade::FadeEnvelope;
pub use gain::{GainHandle, GainStage};
pub use gate::{GateHandle, SampleGate};
pub use unit::{PlaybackUnit, UnitTiming};
