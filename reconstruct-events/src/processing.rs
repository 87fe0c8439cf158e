use crate::events::{EventRecord, LayerReading, ParticleSeed, ReconstructedEvent};
use anyhow::{Context, Result};
use metrics::counter;
use rayon::prelude::*;
use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path, sync::Arc};
use telescope_common::metrics::{
    energy_qualities,
    failures::{self, FailureKind},
    identification_codes, metric_names,
};
use telescope_reconstruction::{
    DetectorLayer, Event, ParticleCandidate, ParticleOutcome, Setup, Trajectory,
    pipeline::ParticleRecord,
};
use tracing::{debug, instrument, warn};

fn count_failure(kind: FailureKind) {
    counter!(metric_names::FAILURES, &[failures::get_label(kind)]).increment(1);
}

pub(crate) fn read_events(path: &Path) -> Result<Vec<EventRecord>> {
    let file = File::open(path)
        .inspect_err(|_| count_failure(FailureKind::EventFileUnreadable))
        .with_context(|| format!("Cannot open event file {}", path.display()))?;
    let events = serde_json::from_reader(BufReader::new(file))
        .inspect_err(|_| count_failure(FailureKind::EventFileMalformed))
        .with_context(|| format!("Malformed event file {}", path.display()))?;
    Ok(events)
}

/// The layers of one event, instantiated once and shared by its particles.
struct EventLayers<'a> {
    setup: &'a Setup,
    readings: &'a BTreeMap<String, LayerReading>,
    instances: BTreeMap<&'a str, Arc<DetectorLayer>>,
}

impl<'a> EventLayers<'a> {
    fn new(setup: &'a Setup, readings: &'a BTreeMap<String, LayerReading>) -> Self {
        Self {
            setup,
            readings,
            instances: Default::default(),
        }
    }

    fn get(&mut self, name: &'a str) -> Option<Arc<DetectorLayer>> {
        if let Some(layer) = self.instances.get(name) {
            return Some(layer.clone());
        }
        let mut layer = self.setup.layer(name)?;
        if let Some(reading) = self.readings.get(name) {
            if reading.calibrated {
                layer = layer.with_energy_loss(reading.energy_loss);
            }
            for (signal, value) in &reading.signals {
                layer = layer.with_signal(signal.clone(), *value);
            }
        }
        let layer = Arc::new(layer);
        self.instances.insert(name, layer.clone());
        Some(layer)
    }

    fn trajectory(&mut self, seed: &'a ParticleSeed) -> Option<Trajectory> {
        let mut layers = Vec::with_capacity(seed.trajectory.len());
        for name in &seed.trajectory {
            let Some(layer) = self.get(name) else {
                warn!("Unknown layer {name}, particle skipped");
                count_failure(FailureKind::UnknownLayer);
                return None;
            };
            layers.push(layer);
        }
        let mut telescopes = Vec::with_capacity(seed.telescopes.len());
        for label in &seed.telescopes {
            match self.setup.telescope(label) {
                Some(telescope) => telescopes.push(telescope.clone()),
                None => {
                    warn!("Unknown telescope {label} ignored");
                    count_failure(FailureKind::UnknownTelescope);
                }
            }
        }
        Some(Trajectory::new(layers).with_telescopes(telescopes))
    }
}

fn build_event(setup: &Setup, record: &EventRecord) -> Event {
    let mut layers = EventLayers::new(setup, &record.layers);
    let particles = record
        .particles
        .iter()
        .filter_map(|seed| layers.trajectory(seed))
        .map(|trajectory| ParticleRecord {
            candidate: ParticleCandidate::new(),
            trajectory,
        })
        .collect();
    Event {
        id: record.id,
        particles,
    }
}

fn record_metrics(outcome: &ParticleOutcome) {
    let code = outcome.identification.code.map(|code| code.code());
    counter!(
        metric_names::PARTICLES_IDENTIFIED,
        &[identification_codes::get_label(code)]
    )
    .increment(1);
    if let Some(calibration) = &outcome.calibration {
        counter!(
            metric_names::PARTICLES_CALIBRATED,
            &[energy_qualities::get_label(calibration.quality.code())]
        )
        .increment(1);
    }
}

#[instrument(skip_all, fields(event_id = record.id))]
pub(crate) fn reconstruct(setup: &Setup, record: &EventRecord) -> ReconstructedEvent {
    let mut event = build_event(setup, record);
    let outcomes = setup.pipeline().process_event(&mut event);
    outcomes.iter().for_each(record_metrics);
    debug!("{} particle(s) reconstructed", outcomes.len());
    counter!(metric_names::EVENTS_PROCESSED).increment(1);
    ReconstructedEvent {
        id: event.id,
        particles: event
            .particles
            .into_iter()
            .map(|particle| particle.candidate)
            .collect(),
    }
}

/// Events are independent, each owning its layers, so they may be
/// reconstructed in parallel.
pub(crate) fn reconstruct_all(
    setup: &Setup,
    records: &[EventRecord],
    sequential: bool,
) -> Vec<ReconstructedEvent> {
    if sequential {
        records
            .iter()
            .map(|record| reconstruct(setup, record))
            .collect()
    } else {
        records
            .par_iter()
            .map(|record| reconstruct(setup, record))
            .collect()
    }
}
