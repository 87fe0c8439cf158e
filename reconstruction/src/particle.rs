use crate::{grid::GridCode, layer::Direction};
use serde::Serialize;
use std::collections::BTreeMap;
use telescope_common::{AtomicNumber, Energy, MassNumber, Real, parameter_key};

/// Confidence in a reconstructed kinetic energy.
#[derive(
    Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, strum::Display,
)]
pub enum EnergyQuality {
    /// At least one layer could not be resolved; the energy must not be used.
    #[default]
    #[strum(to_string = "not calibrated")]
    NotCalibrated,
    /// Every layer was calibrated.
    #[strum(to_string = "measured")]
    Measured,
    /// Some energy losses were inferred from the energy-loss models.
    #[strum(to_string = "calculated")]
    Calculated,
    #[strum(to_string = "punch-through")]
    PunchThrough,
    /// The measured losses do not follow the energy-loss models.
    #[strum(to_string = "incoherent")]
    Incoherent,
}

impl EnergyQuality {
    pub fn code(&self) -> u8 {
        match self {
            Self::NotCalibrated => 0,
            Self::Measured => 1,
            Self::Calculated => 2,
            Self::PunchThrough => 3,
            Self::Incoherent => 4,
        }
    }
}

/// Where a candidate's identification stands.
///
/// `Unattempted → Attempted(code) → Accepted | Rejected | Overridden`
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IdentificationState {
    #[default]
    Unattempted,
    Attempted(GridCode),
    Accepted,
    Rejected,
    /// The primary result was replaced by an alternate telescope's result.
    Overridden,
}

impl IdentificationState {
    /// Settles an attempt according to its grid code.
    pub fn settle(self) -> Self {
        match self {
            Self::Attempted(code) if code.is_acceptable() => Self::Accepted,
            Self::Attempted(_) => Self::Rejected,
            other => other,
        }
    }
}

/// Auxiliary per-particle values, keyed `"<layer>.<signal>"`.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct Parameters(BTreeMap<String, Real>);

impl Parameters {
    pub fn set(&mut self, layer: &str, signal: &str, value: Real) {
        self.0.insert(parameter_key(layer, signal), value);
    }

    pub fn get(&self, layer: &str, signal: &str) -> Option<Real> {
        self.0.get(&parameter_key(layer, signal)).copied()
    }

    pub fn remove(&mut self, layer: &str, signal: &str) -> Option<Real> {
        self.0.remove(&parameter_key(layer, signal))
    }

    /// Removes every signal of `layer`.
    pub fn remove_prefix(&mut self, layer: &str) {
        let prefix = parameter_key(layer, "");
        self.0.retain(|key, _| !key.starts_with(&prefix));
    }

    /// Removes `signals` whatever layer or telescope they belong to.
    pub fn remove_signals(&mut self, signals: &[&str]) {
        self.0.retain(|key, _| {
            key.rsplit_once('.')
                .is_none_or(|(_, signal)| !signals.contains(&signal))
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Real)> {
        self.0.iter().map(|(key, value)| (key.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Most probable mass number for a nucleus of charge `z`, used when the
/// identification only measured Z. Follows the evaporation attractor line,
/// `A = 2.045·Z + 3.57·10⁻³·Z²`, with protons and alphas for Z = 1, 2.
pub fn mass_from_charge(z: AtomicNumber) -> MassNumber {
    match z {
        0 => 0,
        1 => 1,
        2 => 4,
        z => {
            let z = z as Real;
            (2.045 * z + 3.57e-3 * z * z).round() as MassNumber
        }
    }
}

/// A particle under reconstruction. Identification and calibration are
/// separate passes over the same candidate.
#[derive(Default, Debug, Clone, Serialize)]
pub struct ParticleCandidate {
    pub z: AtomicNumber,
    pub a: MassNumber,
    /// Continuous identification value of the identifying telescope.
    pub pid: Option<Real>,
    pub mass_measured: bool,
    pub kinetic_energy: Energy,
    pub target_energy_loss_correction: Energy,
    pub identification_quality: Option<GridCode>,
    pub identification_state: IdentificationState,
    pub identifying_telescope: Option<String>,
    pub energy_quality: EnergyQuality,
    pub direction: Option<Direction>,
    pub is_identified: bool,
    pub is_calibrated: bool,
    pub parameters: Parameters,
}

impl ParticleCandidate {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_za(z: AtomicNumber, a: MassNumber) -> Self {
        Self {
            z,
            a,
            is_identified: true,
            ..Default::default()
        }
    }

    /// Discards every calibration result so the candidate can be calibrated again.
    pub(crate) fn reset_calibration(&mut self) {
        self.kinetic_energy = 0.0;
        self.target_energy_loss_correction = 0.0;
        self.energy_quality = EnergyQuality::NotCalibrated;
        self.direction = None;
        self.is_calibrated = false;
    }
}
