//! The ordered list of layers crossed by one particle, and the
//! identification telescopes formed by pairs of those layers.
use crate::layer::{DetectorLayer, Direction};
use serde::{Deserialize, Serialize};
use std::{slice::Iter, sync::Arc};
use telescope_common::Real;

/// Names one signal of one layer, e.g. `CSI_0101.Energy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SignalSource {
    pub layer: String,
    pub signal: String,
}

impl SignalSource {
    pub fn new(layer: impl Into<String>, signal: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            signal: signal.into(),
        }
    }

    pub fn key(&self) -> String {
        telescope_common::parameter_key(&self.layer, &self.signal)
    }
}

/// A pair of correlated signals read from the trajectory, identified with the
/// grid registered for `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IdentificationTelescope {
    pub label: String,
    pub kind: String,
    pub x: SignalSource,
    pub y: SignalSource,
}

#[derive(Debug, Clone, Default)]
pub struct Trajectory {
    /// Ordered from the layer nearest the source to the stopping layer.
    layers: Vec<Arc<DetectorLayer>>,
    /// Ordered from the telescope containing the stopping layer outward.
    telescopes: Vec<IdentificationTelescope>,
}

impl Trajectory {
    pub fn new(layers: Vec<Arc<DetectorLayer>>) -> Self {
        Self {
            layers,
            telescopes: Vec::new(),
        }
    }

    pub fn with_telescopes(mut self, telescopes: Vec<IdentificationTelescope>) -> Self {
        self.telescopes = telescopes;
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn find_layer(&self, name: &str) -> Option<&DetectorLayer> {
        self.forward().find(|layer| layer.name() == name)
    }

    pub fn stopping_index(&self) -> Option<usize> {
        self.layers.len().checked_sub(1)
    }

    /// Source to stopping layer.
    pub fn forward(
        &self,
    ) -> impl DoubleEndedIterator<Item = &DetectorLayer> + ExactSizeIterator + '_ {
        self.layers.iter().map(Arc::as_ref)
    }

    /// Stopping layer back to the source.
    pub fn backward(&self) -> impl Iterator<Item = &DetectorLayer> + '_ {
        self.forward().rev()
    }

    /// The layers strictly behind `index`, i.e. closer to the stopping point.
    pub fn behind(&self, index: usize) -> &[Arc<DetectorLayer>] {
        self.layers.get(index + 1..).unwrap_or_default()
    }

    /// The layers strictly in front of `index`, i.e. closer to the source.
    pub fn in_front_of(&self, index: usize) -> &[Arc<DetectorLayer>] {
        self.layers
            .get(..index.min(self.layers.len()))
            .unwrap_or_default()
    }

    pub fn telescopes(&self) -> Iter<'_, IdentificationTelescope> {
        self.telescopes.iter()
    }

    /// Reads the value of a signal on one of the trajectory's layers.
    pub fn signal(&self, source: &SignalSource) -> Option<Real> {
        self.find_layer(&source.layer)?.signal(&source.signal)
    }

    /// Direction of the first layer crossed.
    pub fn entrance_direction(&self) -> Option<Direction> {
        self.layers.first().map(|layer| layer.direction())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy_loss::NullModel;

    fn trajectory() -> Trajectory {
        let model = Arc::new(NullModel);
        Trajectory::new(vec![
            Arc::new(DetectorLayer::new("CI", model.clone())),
            Arc::new(DetectorLayer::new("SI", model.clone()).with_signal("PG", 812.0)),
            Arc::new(DetectorLayer::new("CSI", model)),
        ])
    }

    #[test]
    fn slices_around_a_layer() {
        let trajectory = trajectory();
        let behind: Vec<_> = trajectory.behind(0).iter().map(|l| l.name()).collect();
        assert_eq!(behind, ["SI", "CSI"]);
        assert!(trajectory.behind(2).is_empty());
        assert!(trajectory.behind(7).is_empty());

        let in_front: Vec<_> = trajectory.in_front_of(2).iter().map(|l| l.name()).collect();
        assert_eq!(in_front, ["CI", "SI"]);
        assert!(trajectory.in_front_of(0).is_empty());
    }

    #[test]
    fn iterates_both_ways() {
        let trajectory = trajectory();
        let names: Vec<_> = trajectory.backward().map(DetectorLayer::name).collect();
        assert_eq!(names, ["CSI", "SI", "CI"]);
        assert_eq!(trajectory.stopping_index(), Some(2));
    }

    #[test]
    fn reads_signals_by_source() {
        let trajectory = trajectory();
        assert_eq!(trajectory.signal(&SignalSource::new("SI", "PG")), Some(812.0));
        assert_eq!(trajectory.signal(&SignalSource::new("SI", "GG")), None);
        assert_eq!(trajectory.signal(&SignalSource::new("ZZ", "PG")), None);
    }

    #[test]
    fn empty_trajectory_has_no_stopping_index() {
        let trajectory = Trajectory::default();
        assert!(trajectory.is_empty());
        assert_eq!(trajectory.stopping_index(), None);
    }
}
