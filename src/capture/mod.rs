pub mod config;
pub mod fusion;
pub(crate) mod loop_worker;
pub mod producers;
pub mod registry;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::CaptureConfig;
pub use fusion::{fuse, CognitiveState, FusionPolicy, WeightedFusion};
pub use producers::{SignalProducer, SimulatedFace, SimulatedVoice};
pub use registry::{CaptureRegistry, CaptureTask};
pub use store::CaptureStore;
