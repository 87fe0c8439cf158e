use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use telescope_common::{Energy, EventId, Real};
use telescope_reconstruction::ParticleCandidate;

/// What the signal-calibration stage delivered for one layer.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct LayerReading {
    #[serde(default)]
    pub(crate) calibrated: bool,
    /// Only meaningful when `calibrated` is set.
    #[serde(default)]
    pub(crate) energy_loss: Energy,
    #[serde(default)]
    pub(crate) signals: BTreeMap<String, Real>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct ParticleSeed {
    /// Layer names from the source to the stopping layer.
    pub(crate) trajectory: Vec<String>,
    /// Telescope labels from the stopping layer outward.
    #[serde(default)]
    pub(crate) telescopes: Vec<String>,
}

/// One event as read from an event file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct EventRecord {
    pub(crate) id: EventId,
    #[serde(default)]
    pub(crate) layers: BTreeMap<String, LayerReading>,
    pub(crate) particles: Vec<ParticleSeed>,
}

/// One event as written to the output, one per line.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct ReconstructedEvent {
    pub(crate) id: EventId,
    pub(crate) particles: Vec<ParticleCandidate>,
}
