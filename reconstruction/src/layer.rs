use crate::energy_loss::{EnergyLossModel, ParticleSnapshot};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Debug, sync::Arc};
use telescope_common::{AtomicNumber, Energy, MassNumber, Real};

/// Polar and azimuthal angles, in degrees.
#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub theta: Real,
    pub phi: Real,
}

/// One detector of a telescope, as delivered by the signal-calibration stage
/// for the current event. Layers are immutable during reconstruction: the
/// energies inferred for a particle live with that particle's reconstruction.
#[derive(Debug, Clone)]
pub struct DetectorLayer {
    name: String,
    calibrated: bool,
    measured_energy_loss: Energy,
    signals: BTreeMap<String, Real>,
    direction: Direction,
    model: Arc<dyn EnergyLossModel>,
}

impl DetectorLayer {
    pub fn new(name: impl Into<String>, model: Arc<dyn EnergyLossModel>) -> Self {
        Self {
            name: name.into(),
            calibrated: false,
            measured_energy_loss: 0.0,
            signals: Default::default(),
            direction: Default::default(),
            model,
        }
    }

    /// Marks the layer calibrated with the given energy loss.
    pub fn with_energy_loss(mut self, energy_loss: Energy) -> Self {
        self.calibrated = true;
        self.measured_energy_loss = energy_loss;
        self
    }

    pub fn with_signal(mut self, signal: impl Into<String>, value: Real) -> Self {
        self.signals.insert(signal.into(), value);
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn measured_energy_loss(&self) -> Option<Energy> {
        self.calibrated.then_some(self.measured_energy_loss)
    }

    pub fn signal(&self, signal: &str) -> Option<Real> {
        self.signals.get(signal).copied()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn energy_loss_from_residual(
        &self,
        z: AtomicNumber,
        a: MassNumber,
        e_residual: Energy,
    ) -> Energy {
        self.model.energy_loss_from_residual(z, a, e_residual)
    }

    pub fn residual_from_energy_loss(
        &self,
        z: AtomicNumber,
        a: MassNumber,
        energy_loss: Energy,
    ) -> Energy {
        self.model.residual_from_energy_loss(z, a, energy_loss)
    }

    pub fn punch_through_energy(&self, z: AtomicNumber, a: MassNumber) -> Energy {
        self.model.punch_through_energy(z, a)
    }

    pub fn theoretical_energy_loss(&self, particle: &ParticleSnapshot) -> Energy {
        self.model.theoretical_energy_loss(particle)
    }
}
