//! Fixtures shared by the unit tests of the library.
use crate::{
    energy_loss::{EnergyLossModel, ParticleSnapshot},
    grid::{IdentificationGrid, IdentificationLine},
    layer::DetectorLayer,
    trajectory::{IdentificationTelescope, SignalSource},
};
use std::sync::Arc;
use telescope_common::{AtomicNumber, Energy, MassNumber, Real};

/// An energy-loss model giving fixed answers whatever the particle.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub(crate) struct StubModel {
    pub(crate) loss_from_residual: Energy,
    pub(crate) residual_from_loss: Energy,
    pub(crate) punch_through: Energy,
    /// Capped by the energy the particle still carries.
    pub(crate) theoretical_loss: Energy,
}

impl StubModel {
    /// A model whose theoretical loss is `energy_loss` and which is never
    /// punched through.
    pub(crate) fn losing(energy_loss: Energy) -> Self {
        Self {
            punch_through: Energy::MAX,
            theoretical_loss: energy_loss,
            ..Default::default()
        }
    }
}

impl EnergyLossModel for StubModel {
    fn energy_loss_from_residual(&self, _: AtomicNumber, _: MassNumber, _: Energy) -> Energy {
        self.loss_from_residual
    }

    fn residual_from_energy_loss(&self, _: AtomicNumber, _: MassNumber, _: Energy) -> Energy {
        self.residual_from_loss
    }

    fn max_energy_loss(&self, _: AtomicNumber, _: MassNumber) -> Energy {
        self.punch_through
    }

    fn punch_through_energy(&self, _: AtomicNumber, _: MassNumber) -> Energy {
        self.punch_through
    }

    fn theoretical_energy_loss(&self, particle: &ParticleSnapshot) -> Energy {
        self.theoretical_loss.min(particle.kinetic_energy.max(0.0))
    }
}

pub(crate) fn layer(name: &str, model: StubModel) -> Arc<DetectorLayer> {
    Arc::new(DetectorLayer::new(name, Arc::new(model)))
}

pub(crate) fn calibrated_layer(
    name: &str,
    energy_loss: Energy,
    model: StubModel,
) -> Arc<DetectorLayer> {
    Arc::new(DetectorLayer::new(name, Arc::new(model)).with_energy_loss(energy_loss))
}

/// Flat charge lines at y = 10·Z over x in [0, 100].
pub(crate) fn charge_grid(
    kind: &str,
    zs: impl IntoIterator<Item = AtomicNumber>,
) -> IdentificationGrid {
    let lines = zs
        .into_iter()
        .map(|z| {
            let y = 10.0 * z as Real;
            IdentificationLine::new(z, None, vec![(0.0, y), (100.0, y)]).unwrap()
        })
        .collect();
    IdentificationGrid::new(kind, lines).unwrap()
}

pub(crate) fn telescope(
    label: &str,
    kind: &str,
    x: (&str, &str),
    y: (&str, &str),
) -> IdentificationTelescope {
    IdentificationTelescope {
        label: label.to_owned(),
        kind: kind.to_owned(),
        x: SignalSource::new(x.0, x.1),
        y: SignalSource::new(y.0, y.1),
    }
}
