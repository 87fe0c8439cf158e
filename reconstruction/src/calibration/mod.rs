//! Total kinetic energy of an identified candidate from the energy it left in
//! the layers of its trajectory.
mod geometry;

pub use geometry::{ArrayGeometry, NoTarget, ThinTarget};

use crate::{
    energy_loss::ParticleSnapshot,
    particle::{EnergyQuality, ParticleCandidate},
    trajectory::Trajectory,
};
use serde::Deserialize;
use std::sync::Arc;
use telescope_common::{Energy, Real};
use tracing::{debug, instrument, trace};

/// Normalised chi-square above which measured losses are declared incoherent.
pub const DEFAULT_CHI_SQUARE_THRESHOLD: Real = 10.0;

/// Energy the avatar may keep after the last layer without being considered
/// to have punched through.
const RESIDUAL_ENERGY_TOLERANCE: Energy = 1e-6;

const CALIBRATION: &str = "Calibration";

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReconstructionSettings {
    #[serde(default = "default_chi_square_threshold")]
    pub chi_square_threshold: Real,
}

fn default_chi_square_threshold() -> Real {
    DEFAULT_CHI_SQUARE_THRESHOLD
}

impl Default for ReconstructionSettings {
    fn default() -> Self {
        Self {
            chi_square_threshold: DEFAULT_CHI_SQUARE_THRESHOLD,
        }
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOutcome {
    pub kinetic_energy: Energy,
    pub quality: EnergyQuality,
    /// Only set when every layer was resolved.
    pub chi_square: Option<Real>,
}

/// The energy lost in each layer of one trajectory, as far as it is known,
/// while one candidate is being calibrated.
#[derive(Debug, Clone)]
struct ResolvedEnergies {
    energies: Vec<Option<Energy>>,
    inferred: Vec<bool>,
}

impl ResolvedEnergies {
    fn new(len: usize) -> Self {
        Self {
            energies: vec![None; len],
            inferred: vec![false; len],
        }
    }

    fn get(&self, index: usize) -> Option<Energy> {
        self.energies.get(index).copied().flatten()
    }

    fn resolve(&mut self, index: usize, energy: Energy, inferred: bool) {
        let slots = (self.energies.get_mut(index), self.inferred.get_mut(index));
        if let (Some(slot), Some(flag)) = slots {
            *slot = Some(energy);
            *flag = inferred;
        }
    }

    fn is_inferred(&self, index: usize) -> bool {
        self.inferred.get(index).copied().unwrap_or_default()
    }

    fn any_inferred(&self) -> bool {
        self.inferred.iter().any(|&inferred| inferred)
    }

    fn is_complete(&self) -> bool {
        self.energies.iter().all(Option::is_some)
    }

    fn unresolved(&self) -> usize {
        self.energies.iter().filter(|energy| energy.is_none()).count()
    }

    fn total(&self) -> Energy {
        self.energies.iter().flatten().sum()
    }

    /// Sum of the losses in the layers of `trajectory` behind `index`.
    /// Unavailable when there are none, or when one of them is unresolved or
    /// not positive.
    fn sum_behind(&self, trajectory: &Trajectory, index: usize) -> Option<Energy> {
        let behind = trajectory.behind(index);
        if behind.is_empty() {
            return None;
        }
        (index + 1..index + 1 + behind.len()).try_fold(0.0, |sum, behind| {
            self.get(behind)
                .filter(|&energy| energy > 0.0)
                .map(|energy| sum + energy)
        })
    }

    fn iter(&self) -> impl DoubleEndedIterator<Item = Option<Energy>> + '_ {
        self.energies.iter().copied()
    }
}

/// Computes the kinetic energy of candidates identified in a telescope, from
/// the measured losses and the energy-loss models of its layers.
#[derive(Debug, Clone)]
pub struct TelescopeEnergyReconstructor {
    settings: ReconstructionSettings,
    geometry: Arc<dyn ArrayGeometry>,
}

impl Default for TelescopeEnergyReconstructor {
    fn default() -> Self {
        Self::new(Default::default(), Arc::new(NoTarget))
    }
}

impl TelescopeEnergyReconstructor {
    pub fn new(settings: ReconstructionSettings, geometry: Arc<dyn ArrayGeometry>) -> Self {
        Self { settings, geometry }
    }

    pub fn settings(&self) -> &ReconstructionSettings {
        &self.settings
    }

    /// Calibrates `candidate`, whose Z and A must already be set.
    ///
    /// Any previous calibration of the candidate is discarded first, so
    /// calling this again on an unmodified candidate gives the same result.
    #[instrument(skip_all, fields(z = candidate.z, a = candidate.a, quality))]
    pub fn calibrate(
        &self,
        candidate: &mut ParticleCandidate,
        trajectory: &Trajectory,
    ) -> CalibrationOutcome {
        candidate.reset_calibration();
        for layer in trajectory.forward() {
            candidate.parameters.remove(layer.name(), "ELoss");
            candidate.parameters.remove(layer.name(), "Inferred");
        }
        candidate.parameters.remove_prefix(CALIBRATION);

        if trajectory.is_empty() {
            debug!("Empty trajectory");
            return CalibrationOutcome::default();
        }
        let resolved = self.resolve(candidate, trajectory);
        if !resolved.is_complete() {
            debug!("{} layer(s) could not be resolved", resolved.unresolved());
            tracing::Span::current().record("quality", EnergyQuality::NotCalibrated.code());
            return CalibrationOutcome::default();
        }

        let total = resolved.total();
        let chi_square = self.coherency(candidate, trajectory, &resolved, total);
        let punch_through = chi_square.residual_energy > RESIDUAL_ENERGY_TOLERANCE;
        let incoherent = !punch_through && chi_square.value > self.settings.chi_square_threshold;

        candidate.kinetic_energy = total;
        let correction = self.geometry.target_energy_loss_correction(candidate);
        candidate.target_energy_loss_correction = correction;
        candidate.kinetic_energy = total + correction;
        candidate.direction = self.geometry.direction(trajectory);

        candidate.energy_quality = if punch_through {
            EnergyQuality::PunchThrough
        } else if incoherent {
            EnergyQuality::Incoherent
        } else if resolved.any_inferred() {
            EnergyQuality::Calculated
        } else {
            EnergyQuality::Measured
        };
        candidate.is_calibrated = true;

        for (index, layer) in trajectory.forward().enumerate() {
            if let Some(energy) = resolved.get(index) {
                candidate.parameters.set(layer.name(), "ELoss", energy);
            }
            if resolved.is_inferred(index) {
                candidate.parameters.set(layer.name(), "Inferred", 1.0);
            }
        }
        let parameters = &mut candidate.parameters;
        parameters.set(CALIBRATION, "Chi2", chi_square.value);
        parameters.set(CALIBRATION, "PunchThrough", if punch_through { 1.0 } else { 0.0 });
        parameters.set(CALIBRATION, "Incoherent", if incoherent { 1.0 } else { 0.0 });
        parameters.set(CALIBRATION, "TargetCorrection", correction);

        tracing::Span::current().record("quality", candidate.energy_quality.code());
        debug!(
            "E = {:.3} MeV ({}), chi2 = {:.3}",
            candidate.kinetic_energy, candidate.energy_quality, chi_square.value
        );
        CalibrationOutcome {
            kinetic_energy: candidate.kinetic_energy,
            quality: candidate.energy_quality,
            chi_square: Some(chi_square.value),
        }
    }

    /// Measured losses first, then whatever can be inferred from them.
    fn resolve(&self, candidate: &ParticleCandidate, trajectory: &Trajectory) -> ResolvedEnergies {
        let (z, a) = (candidate.z, candidate.a);
        let mut resolved = ResolvedEnergies::new(trajectory.len());
        for (index, layer) in trajectory.forward().enumerate() {
            if let Some(energy) = layer.measured_energy_loss() {
                resolved.resolve(index, energy, false);
            }
        }
        if resolved.is_complete() {
            return resolved;
        }

        // The layer in front of the stopping layer.
        let front = trajectory.stopping_index().and_then(|stop| {
            let front = trajectory.in_front_of(stop).last()?;
            Some((stop - 1, Arc::as_ref(front)))
        });
        for (index, layer) in trajectory.forward().enumerate() {
            if resolved.get(index).is_some() {
                continue;
            }
            if let Some(residual) = resolved.sum_behind(trajectory, index) {
                let energy = layer.energy_loss_from_residual(z, a, residual);
                trace!("{}: {energy:.3} MeV from {residual:.3} MeV behind", layer.name());
                resolved.resolve(index, energy, true);
                continue;
            }
            let Some((front, front_energy)) =
                front.and_then(|(front_index, front)| Some((front, resolved.get(front_index)?)))
            else {
                continue;
            };
            let energy = front.residual_from_energy_loss(z, a, front_energy);
            let punch_through = layer.punch_through_energy(z, a);
            if energy > punch_through {
                debug!(
                    "{}: {energy:.3} MeV inferred from {} exceeds punch-through at {punch_through:.3} MeV",
                    layer.name(),
                    front.name()
                );
                continue;
            }
            trace!("{}: {energy:.3} MeV from {} loss", layer.name(), front.name());
            resolved.resolve(index, energy, true);
        }
        resolved
    }

    /// Follows an avatar of the candidate carrying the total energy back
    /// through the layers and compares its losses to the resolved ones.
    fn coherency(
        &self,
        candidate: &ParticleCandidate,
        trajectory: &Trajectory,
        resolved: &ResolvedEnergies,
        total: Energy,
    ) -> ChiSquare {
        let mut avatar = ParticleSnapshot::new(candidate.z, candidate.a, total);
        let mut value = 0.0;
        for (layer, measured) in trajectory.backward().zip(resolved.iter().rev()) {
            let theoretical = layer.theoretical_energy_loss(&avatar);
            let measured = measured.unwrap_or_default();
            if measured > 0.0 {
                value += ((measured - theoretical) / measured).powi(2);
            }
            avatar.kinetic_energy -= theoretical;
        }
        ChiSquare {
            value: value / trajectory.len() as Real,
            residual_energy: avatar.kinetic_energy,
        }
    }
}

struct ChiSquare {
    value: Real,
    /// Kinetic energy the avatar still carries after the last layer.
    residual_energy: Energy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        energy_loss::{EnergyLossModel, RangeEnergyModel},
        layer::{DetectorLayer, Direction},
        testing::{StubModel, calibrated_layer, layer},
    };
    use assert_approx_eq::assert_approx_eq;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn calibrate(candidate: &mut ParticleCandidate, trajectory: &Trajectory) -> CalibrationOutcome {
        TelescopeEnergyReconstructor::default().calibrate(candidate, trajectory)
    }

    fn helium() -> ParticleCandidate {
        ParticleCandidate::with_za(2, 4)
    }

    /// dE (calibrated, 5 MeV) in front of Eres (not calibrated) whose energy
    /// is inferred as 40 MeV from the dE loss.
    fn delta_e_residual(eres_punch_through: Energy) -> Trajectory {
        let delta_e = StubModel {
            residual_from_loss: 40.0,
            ..StubModel::losing(5.0)
        };
        let residual = StubModel {
            punch_through: eres_punch_through,
            ..StubModel::losing(40.0)
        };
        Trajectory::new(vec![
            calibrated_layer("dE", 5.0, delta_e),
            layer("Eres", residual),
        ])
    }

    #[test]
    fn residual_inferred_from_front_layer() {
        let mut candidate = helium();
        let outcome = calibrate(&mut candidate, &delta_e_residual(100.0));

        assert_approx_eq!(outcome.kinetic_energy, 45.0);
        assert_eq!(outcome.quality, EnergyQuality::Calculated);
        assert_eq!(candidate.energy_quality.code(), 2);
        assert!(candidate.is_calibrated);
        assert_eq!(candidate.parameters.get("Eres", "ELoss"), Some(40.0));
        assert_eq!(candidate.parameters.get("Eres", "Inferred"), Some(1.0));
        assert_eq!(candidate.parameters.get("dE", "Inferred"), None);
        assert_eq!(candidate.parameters.get("Calibration", "Chi2"), Some(0.0));
    }

    #[test]
    fn inference_beyond_punch_through_is_rejected() {
        let mut candidate = helium();
        let outcome = calibrate(&mut candidate, &delta_e_residual(30.0));

        assert_eq!(outcome, CalibrationOutcome::default());
        assert_eq!(candidate.energy_quality, EnergyQuality::NotCalibrated);
        assert_eq!(candidate.kinetic_energy, 0.0);
        assert!(!candidate.is_calibrated);
        assert_eq!(candidate.parameters.get("Calibration", "Chi2"), None);
    }

    #[test]
    fn front_layer_inferred_from_layers_behind() {
        let delta_e = StubModel {
            loss_from_residual: 12.0,
            ..StubModel::losing(12.0)
        };
        let trajectory = Trajectory::new(vec![
            layer("SI", delta_e),
            calibrated_layer("CSI", 80.0, StubModel::losing(80.0)),
        ]);
        let mut candidate = helium();
        let outcome = calibrate(&mut candidate, &trajectory);

        assert_approx_eq!(outcome.kinetic_energy, 92.0);
        assert_eq!(outcome.quality, EnergyQuality::Calculated);
        assert_eq!(candidate.parameters.get("SI", "ELoss"), Some(12.0));
        assert_eq!(candidate.parameters.get("SI", "Inferred"), Some(1.0));
    }

    #[test]
    fn energy_loss_inferred_from_a_range_energy_model() {
        let silicon = RangeEnergyModel::new(35.0, 3.0, 1.75);
        let expected = silicon.energy_loss_from_residual(2, 4, 60.0);
        let trajectory = Trajectory::new(vec![
            Arc::new(DetectorLayer::new("SI", Arc::new(silicon))),
            calibrated_layer("CSI", 60.0, StubModel::losing(60.0)),
        ]);
        let mut candidate = helium();
        let outcome = calibrate(&mut candidate, &trajectory);

        assert_approx_eq!(outcome.kinetic_energy, expected + 60.0);
        assert_eq!(candidate.parameters.get("SI", "ELoss"), Some(expected));
    }

    fn measured(losses: &[Energy]) -> Trajectory {
        Trajectory::new(
            losses
                .iter()
                .enumerate()
                .map(|(index, &loss)| {
                    calibrated_layer(&format!("L{index}"), loss, StubModel::losing(loss))
                })
                .collect(),
        )
    }

    #[test]
    fn fully_measured_is_idempotent() {
        let trajectory = measured(&[3.5, 11.0, 64.25]);
        let reconstructor = TelescopeEnergyReconstructor::default();
        let mut candidate = helium();
        let first = reconstructor.calibrate(&mut candidate, &trajectory);
        let parameters = candidate.parameters.clone();
        let second = reconstructor.calibrate(&mut candidate, &trajectory);

        assert_eq!(first, second);
        assert_eq!(second.quality, EnergyQuality::Measured);
        assert_approx_eq!(second.kinetic_energy, 78.75);
        assert_eq!(candidate.parameters, parameters);
    }

    #[test]
    fn avatar_keeping_energy_punched_through() {
        let trajectory = Trajectory::new(vec![
            calibrated_layer("SI", 5.0, StubModel::losing(2.0)),
            calibrated_layer("CSI", 40.0, StubModel::losing(20.0)),
        ]);
        let mut candidate = helium();
        let outcome = calibrate(&mut candidate, &trajectory);

        assert_eq!(outcome.quality, EnergyQuality::PunchThrough);
        assert_approx_eq!(outcome.kinetic_energy, 45.0);
        assert_eq!(candidate.parameters.get("Calibration", "PunchThrough"), Some(1.0));
        assert_eq!(candidate.parameters.get("Calibration", "Incoherent"), Some(0.0));
    }

    #[test]
    fn losses_far_from_the_models_are_incoherent() {
        let trajectory = Trajectory::new(vec![
            calibrated_layer("SI", 1.0, StubModel::losing(50.0)),
            calibrated_layer("CSI", 44.0, StubModel::losing(2.0)),
        ]);
        let mut candidate = helium();
        let reconstructor = TelescopeEnergyReconstructor::default();
        let outcome = reconstructor.calibrate(&mut candidate, &trajectory);

        assert_eq!(outcome.quality, EnergyQuality::Incoherent);
        // ((44 - 2) / 44)² + ((1 - 43) / 1)², over two layers
        let expected = ((42.0_f64 / 44.0).powi(2) + 42.0_f64.powi(2)) / 2.0;
        assert_approx_eq!(outcome.chi_square.unwrap_or_default(), expected, 1e-9);

        let tolerant = TelescopeEnergyReconstructor::new(
            ReconstructionSettings {
                chi_square_threshold: 1000.0,
            },
            Arc::new(NoTarget),
        );
        let outcome = tolerant.calibrate(&mut candidate, &trajectory);
        assert_eq!(outcome.quality, EnergyQuality::Measured);
    }

    #[test]
    fn empty_trajectory_is_not_calibrated() {
        let mut candidate = helium();
        let outcome = calibrate(&mut candidate, &Trajectory::default());
        assert_eq!(outcome, CalibrationOutcome::default());
        assert!(!candidate.is_calibrated);
        assert!(candidate.parameters.is_empty());
    }

    #[test]
    fn unresolvable_layer_is_not_calibrated() {
        // Nothing behind the stopping layer and nothing measured in front of it.
        let trajectory = Trajectory::new(vec![
            layer("SI", StubModel::losing(5.0)),
            layer("CSI", StubModel::losing(40.0)),
        ]);
        let mut candidate = helium();
        let outcome = calibrate(&mut candidate, &trajectory);
        assert_eq!(outcome.quality, EnergyQuality::NotCalibrated);
    }

    #[test]
    fn recalibration_discards_previous_result() {
        let mut candidate = helium();
        let reconstructor = TelescopeEnergyReconstructor::default();
        reconstructor.calibrate(&mut candidate, &measured(&[5.0, 40.0]));
        assert!(candidate.is_calibrated);

        reconstructor.calibrate(&mut candidate, &delta_e_residual(30.0));
        assert!(!candidate.is_calibrated);
        assert_eq!(candidate.kinetic_energy, 0.0);
        assert_eq!(candidate.parameters.get("Calibration", "Chi2"), None);
    }

    #[test]
    fn target_correction_and_direction() {
        let half_target = StubModel {
            loss_from_residual: 0.75,
            ..Default::default()
        };
        let reconstructor = TelescopeEnergyReconstructor::new(
            Default::default(),
            Arc::new(ThinTarget::new(Arc::new(half_target))),
        );
        let direction = Direction {
            theta: 35.0,
            phi: 90.0,
        };
        let trajectory = Trajectory::new(vec![
            Arc::new(
                DetectorLayer::new("SI", Arc::new(StubModel::losing(5.0)))
                    .with_energy_loss(5.0)
                    .with_direction(direction),
            ),
            calibrated_layer("CSI", 40.0, StubModel::losing(40.0)),
        ]);
        let mut candidate = helium();
        let outcome = reconstructor.calibrate(&mut candidate, &trajectory);

        assert_eq!(outcome.quality, EnergyQuality::Measured);
        assert_approx_eq!(outcome.kinetic_energy, 45.75);
        assert_approx_eq!(candidate.target_energy_loss_correction, 0.75);
        assert_eq!(candidate.direction, Some(direction));
        assert_eq!(candidate.parameters.get("Calibration", "TargetCorrection"), Some(0.75));
    }

    /// Higher is worse.
    fn rank(quality: EnergyQuality) -> u8 {
        match quality {
            EnergyQuality::Measured => 0,
            EnergyQuality::Calculated => 1,
            EnergyQuality::PunchThrough | EnergyQuality::Incoherent => 2,
            EnergyQuality::NotCalibrated => 3,
        }
    }

    #[test]
    fn losing_a_measurement_never_improves_quality() {
        let mut rng = StdRng::seed_from_u64(0x7e1e5c0);
        let reconstructor = TelescopeEnergyReconstructor::default();
        for _ in 0..200 {
            let depth = rng.random_range(1..=5);
            let layers: Vec<(Energy, StubModel)> = (0..depth)
                .map(|_| {
                    let loss = rng.random_range(0.5..100.0);
                    let model = StubModel {
                        loss_from_residual: rng.random_range(0.5..100.0),
                        residual_from_loss: rng.random_range(0.5..100.0),
                        punch_through: rng.random_range(0.5..200.0),
                        theoretical_loss: loss,
                    };
                    (loss, model)
                })
                .collect();
            let build = |degraded: Option<usize>| {
                Trajectory::new(
                    layers
                        .iter()
                        .enumerate()
                        .map(|(index, &(loss, model))| {
                            let name = format!("L{index}");
                            if Some(index) == degraded {
                                layer(&name, model)
                            } else {
                                calibrated_layer(&name, loss, model)
                            }
                        })
                        .collect(),
                )
            };

            let mut candidate = helium();
            let baseline = reconstructor.calibrate(&mut candidate, &build(None)).quality;
            assert_eq!(baseline, EnergyQuality::Measured);

            let degraded = rng.random_range(0..depth);
            let quality = reconstructor
                .calibrate(&mut candidate, &build(Some(degraded)))
                .quality;
            assert_ne!(quality, EnergyQuality::Measured);
            assert!(rank(quality) >= rank(baseline));
        }
    }
}
