//! Identification then calibration of the particles of one event.
use crate::{
    calibration::{CalibrationOutcome, TelescopeEnergyReconstructor},
    identifier::{IdentificationOutcome, Identifier},
    particle::{ParticleCandidate, mass_from_charge},
    trajectory::Trajectory,
};
use telescope_common::EventId;
use tracing::{debug, instrument};

/// A candidate together with the layers it crossed.
#[derive(Debug, Clone, Default)]
pub struct ParticleRecord {
    pub candidate: ParticleCandidate,
    pub trajectory: Trajectory,
}

/// The particles of one event. Each event owns its layers.
#[derive(Debug, Clone, Default)]
pub struct Event {
    pub id: EventId,
    pub particles: Vec<ParticleRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticleOutcome {
    pub identification: IdentificationOutcome,
    /// Not set for candidates left unidentified or neutral.
    pub calibration: Option<CalibrationOutcome>,
}

#[derive(Debug, Clone, Default)]
pub struct ParticlePipeline {
    identifier: Identifier,
    reconstructor: TelescopeEnergyReconstructor,
}

impl ParticlePipeline {
    pub fn new(identifier: Identifier, reconstructor: TelescopeEnergyReconstructor) -> Self {
        Self {
            identifier,
            reconstructor,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn reconstructor(&self) -> &TelescopeEnergyReconstructor {
        &self.reconstructor
    }

    pub fn process(
        &self,
        candidate: &mut ParticleCandidate,
        trajectory: &Trajectory,
    ) -> ParticleOutcome {
        let identification = self.identifier.identify(candidate, trajectory);
        if !candidate.is_identified || candidate.z == 0 {
            debug!("Candidate not identified, skipping calibration");
            return ParticleOutcome {
                identification,
                calibration: None,
            };
        }
        if !candidate.mass_measured {
            candidate.a = mass_from_charge(candidate.z);
        }
        let calibration = self.reconstructor.calibrate(candidate, trajectory);
        ParticleOutcome {
            identification,
            calibration: Some(calibration),
        }
    }

    /// Particles are processed in order; one particle's result never
    /// prevents the others from being processed.
    #[instrument(skip_all, fields(event_id = event.id, particles = event.particles.len()))]
    pub fn process_event(&self, event: &mut Event) -> Vec<ParticleOutcome> {
        event
            .particles
            .iter_mut()
            .map(|particle| self.process(&mut particle.candidate, &particle.trajectory))
            .collect()
    }
}
