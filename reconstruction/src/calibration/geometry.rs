use crate::{
    energy_loss::EnergyLossModel, layer::Direction, particle::ParticleCandidate,
    trajectory::Trajectory,
};
use std::{fmt::Debug, sync::Arc};
use telescope_common::Energy;

/// Array-level knowledge needed to complete a calibration.
pub trait ArrayGeometry: Debug + Send + Sync {
    /// Energy lost in the target before reaching the first layer.
    fn target_energy_loss_correction(&self, candidate: &ParticleCandidate) -> Energy;

    fn direction(&self, trajectory: &Trajectory) -> Option<Direction>;
}

/// No target material between source and detectors.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoTarget;

impl ArrayGeometry for NoTarget {
    fn target_energy_loss_correction(&self, _: &ParticleCandidate) -> Energy {
        0.0
    }

    fn direction(&self, trajectory: &Trajectory) -> Option<Direction> {
        trajectory.entrance_direction()
    }
}

/// A target where particles are emitted from its middle, so they cross the
/// half-thickness described by `half_target` before reaching the array.
#[derive(Debug, Clone)]
pub struct ThinTarget {
    half_target: Arc<dyn EnergyLossModel>,
}

impl ThinTarget {
    pub fn new(half_target: Arc<dyn EnergyLossModel>) -> Self {
        Self { half_target }
    }
}

impl ArrayGeometry for ThinTarget {
    fn target_energy_loss_correction(&self, candidate: &ParticleCandidate) -> Energy {
        if candidate.z == 0 || candidate.kinetic_energy <= 0.0 {
            return 0.0;
        }
        self.half_target
            .energy_loss_from_residual(candidate.z, candidate.a, candidate.kinetic_energy)
    }

    fn direction(&self, trajectory: &Trajectory) -> Option<Direction> {
        trajectory.entrance_direction()
    }
}
