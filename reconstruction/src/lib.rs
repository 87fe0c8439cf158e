//! Identification and energy reconstruction of the charged particles
//! detected by telescopes of stacked detector layers.
pub mod calibration;
pub mod config;
pub mod energy_loss;
pub mod error;
pub mod grid;
pub mod identifier;
pub mod layer;
pub mod particle;
pub mod pipeline;
#[cfg(test)]
mod testing;
pub mod trajectory;

pub use calibration::{
    ArrayGeometry, CalibrationOutcome, ReconstructionSettings, TelescopeEnergyReconstructor,
};
pub use config::{Setup, SetupConfig};
pub use energy_loss::{EnergyLossModel, ParticleSnapshot};
pub use error::SetupError;
pub use identifier::{IdentificationOutcome, Identifier};
pub use layer::DetectorLayer;
pub use particle::{EnergyQuality, IdentificationState, ParticleCandidate};
pub use pipeline::{Event, ParticleOutcome, ParticlePipeline, ParticleRecord};
pub use trajectory::Trajectory;
