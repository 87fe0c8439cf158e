//! Physical energy-loss relations of a detector layer.
//!
//! The reconstructor only ever talks to [EnergyLossModel], so each kind of
//! layer can bring its own material description.
use std::fmt::Debug;
use telescope_common::{AtomicNumber, Energy, MassNumber, Real};

/// The state of a particle as seen by a model: charge, mass and the kinetic
/// energy with which it enters the layer.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct ParticleSnapshot {
    pub z: AtomicNumber,
    pub a: MassNumber,
    pub kinetic_energy: Energy,
}

impl ParticleSnapshot {
    pub fn new(z: AtomicNumber, a: MassNumber, kinetic_energy: Energy) -> Self {
        Self {
            z,
            a,
            kinetic_energy,
        }
    }
}

pub trait EnergyLossModel: Debug + Send + Sync {
    /// Energy lost in the layer by a particle which leaves it with `e_residual`.
    fn energy_loss_from_residual(&self, z: AtomicNumber, a: MassNumber, e_residual: Energy)
    -> Energy;

    /// Energy left after the layer by a particle which lost `energy_loss` in it.
    /// Returns zero when the particle cannot have left the layer.
    fn residual_from_energy_loss(
        &self,
        z: AtomicNumber,
        a: MassNumber,
        energy_loss: Energy,
    ) -> Energy;

    fn max_energy_loss(&self, z: AtomicNumber, a: MassNumber) -> Energy;

    /// Smallest incident energy with which the particle leaves the layer.
    fn punch_through_energy(&self, z: AtomicNumber, a: MassNumber) -> Energy;

    fn theoretical_energy_loss(&self, particle: &ParticleSnapshot) -> Energy;
}

/// A layer without material, e.g. a gas volume with no useful description.
#[derive(Default, Debug, Clone, Copy)]
pub struct NullModel;

impl EnergyLossModel for NullModel {
    fn energy_loss_from_residual(&self, _: AtomicNumber, _: MassNumber, _: Energy) -> Energy {
        0.0
    }

    fn residual_from_energy_loss(&self, _: AtomicNumber, _: MassNumber, _: Energy) -> Energy {
        0.0
    }

    fn max_energy_loss(&self, _: AtomicNumber, _: MassNumber) -> Energy {
        0.0
    }

    fn punch_through_energy(&self, _: AtomicNumber, _: MassNumber) -> Energy {
        0.0
    }

    fn theoretical_energy_loss(&self, _: &ParticleSnapshot) -> Energy {
        0.0
    }
}

const BISECTION_ITERATIONS: usize = 100;
const MAX_BRACKET_DOUBLINGS: usize = 64;

/// Power-law range–energy relation, `R(E) = k · A/Z² · (E/A)^β`, for an
/// absorber of areal thickness `thickness` (mg/cm²).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeEnergyModel {
    thickness: Real,
    k: Real,
    beta: Real,
}

impl RangeEnergyModel {
    pub fn new(thickness: Real, k: Real, beta: Real) -> Self {
        Self { thickness, k, beta }
    }

    pub fn thickness(&self) -> Real {
        self.thickness
    }

    fn is_stopping(z: AtomicNumber, a: MassNumber) -> bool {
        z > 0 && a > 0
    }

    fn range(&self, z: AtomicNumber, a: MassNumber, energy: Energy) -> Real {
        let (z, a) = (z as Real, a as Real);
        self.k * a / (z * z) * (energy.max(0.0) / a).powf(self.beta)
    }

    fn energy_from_range(&self, z: AtomicNumber, a: MassNumber, range: Real) -> Energy {
        let (z, a) = (z as Real, a as Real);
        a * (range.max(0.0) * z * z / (self.k * a)).powf(1.0 / self.beta)
    }
}

impl EnergyLossModel for RangeEnergyModel {
    fn energy_loss_from_residual(
        &self,
        z: AtomicNumber,
        a: MassNumber,
        e_residual: Energy,
    ) -> Energy {
        if !Self::is_stopping(z, a) {
            return 0.0;
        }
        let e_residual = e_residual.max(0.0);
        let incident = self.energy_from_range(z, a, self.range(z, a, e_residual) + self.thickness);
        incident - e_residual
    }

    fn residual_from_energy_loss(
        &self,
        z: AtomicNumber,
        a: MassNumber,
        energy_loss: Energy,
    ) -> Energy {
        if !Self::is_stopping(z, a)
            || energy_loss <= 0.0
            || energy_loss >= self.max_energy_loss(z, a)
        {
            return 0.0;
        }
        // The energy loss falls monotonically with the residual energy, so
        // bracket the solution then bisect.
        let mut high = energy_loss.max(1.0);
        for _ in 0..MAX_BRACKET_DOUBLINGS {
            if self.energy_loss_from_residual(z, a, high) < energy_loss {
                break;
            }
            high *= 2.0;
        }
        let mut low = 0.0;
        for _ in 0..BISECTION_ITERATIONS {
            let middle = 0.5 * (low + high);
            if self.energy_loss_from_residual(z, a, middle) > energy_loss {
                low = middle;
            } else {
                high = middle;
            }
        }
        0.5 * (low + high)
    }

    fn max_energy_loss(&self, z: AtomicNumber, a: MassNumber) -> Energy {
        self.punch_through_energy(z, a)
    }

    fn punch_through_energy(&self, z: AtomicNumber, a: MassNumber) -> Energy {
        if !Self::is_stopping(z, a) {
            return 0.0;
        }
        self.energy_from_range(z, a, self.thickness)
    }

    fn theoretical_energy_loss(&self, particle: &ParticleSnapshot) -> Energy {
        let ParticleSnapshot {
            z,
            a,
            kinetic_energy,
        } = *particle;
        if !Self::is_stopping(z, a) || kinetic_energy <= 0.0 {
            return 0.0;
        }
        let range = self.range(z, a, kinetic_energy);
        if range <= self.thickness {
            kinetic_energy
        } else {
            kinetic_energy - self.energy_from_range(z, a, range - self.thickness)
        }
    }
}
