//! The setup file: detector layers, identification grids, telescopes and
//! identification rules, read from JSON and validated into the types used
//! during reconstruction.
use crate::{
    calibration::{
        ArrayGeometry, NoTarget, ReconstructionSettings, TelescopeEnergyReconstructor, ThinTarget,
    },
    energy_loss::{EnergyLossModel, NullModel, RangeEnergyModel},
    error::{CutRole, GridError, SetupError},
    grid::{
        CutSide, GridCuts, IdentificationCut, IdentificationGrid, IdentificationLine, IntervalKind,
        IntervalSet, MassInterval,
    },
    identifier::{GridRegistry, IdentificationRules, Identifier},
    layer::{DetectorLayer, Direction},
    pipeline::ParticlePipeline,
    trajectory::IdentificationTelescope,
};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, btree_map::Entry},
    sync::Arc,
};
use telescope_common::{AtomicNumber, MassNumber, Real};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SetupConfig {
    pub layers: Vec<LayerConfig>,
    pub grids: Vec<GridConfig>,
    pub telescopes: Vec<IdentificationTelescope>,
    #[serde(default)]
    pub rules: IdentificationRules,
    /// Half the target, crossed by every particle before the array.
    #[serde(default)]
    pub target: Option<ModelConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LayerConfig {
    pub name: String,
    pub model: ModelConfig,
    #[serde(default)]
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "model-type")]
pub enum ModelConfig {
    Range {
        /// Areal thickness (mg/cm²).
        thickness: Real,
        k: Real,
        beta: Real,
    },
    Null,
}

impl ModelConfig {
    fn build(&self, layer: &str) -> Result<Arc<dyn EnergyLossModel>, SetupError> {
        match *self {
            Self::Range { thickness, k, beta } => {
                for (name, value) in [("thickness", thickness), ("k", k), ("beta", beta)] {
                    if !(value.is_finite() && value > 0.0) {
                        return Err(SetupError::InvalidModel {
                            layer: layer.to_owned(),
                            reason: format!("{name} must be positive, got {value}"),
                        });
                    }
                }
                Ok(Arc::new(RangeEnergyModel::new(thickness, k, beta)))
            }
            Self::Null => Ok(Arc::new(NullModel)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LineConfig {
    pub z: AtomicNumber,
    #[serde(default)]
    pub a: Option<MassNumber>,
    pub points: Vec<(Real, Real)>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CutConfig {
    pub side: CutSide,
    pub points: Vec<(Real, Real)>,
}

#[derive(Default, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CutsConfig {
    pub gamma: Option<CutConfig>,
    pub threshold: Option<CutConfig>,
    pub punch_through: Option<CutConfig>,
    pub mass: Option<CutConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IntervalSetConfig {
    pub z: AtomicNumber,
    pub intervals: Vec<MassInterval>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IntervalsConfig {
    #[serde(rename = "type")]
    pub kind: IntervalKind,
    pub sets: Vec<IntervalSetConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GridConfig {
    /// The telescope kind the grid identifies.
    pub kind: String,
    pub lines: Vec<LineConfig>,
    #[serde(default)]
    pub cuts: CutsConfig,
    #[serde(default)]
    pub intervals: Option<IntervalsConfig>,
}

impl GridConfig {
    fn build(self) -> Result<IdentificationGrid, GridError> {
        let kind = self.kind;
        let lines = self
            .lines
            .into_iter()
            .map(|line| {
                IdentificationLine::new(line.z, line.a, line.points).map_err(|source| {
                    GridError::Line {
                        kind: kind.clone(),
                        z: line.z,
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let cut = |config: Option<CutConfig>, role: CutRole| {
            config
                .map(|cut| IdentificationCut::new(cut.side, cut.points))
                .transpose()
                .map_err(|source| GridError::Cut {
                    kind: kind.clone(),
                    role,
                    source,
                })
        };
        let cuts = GridCuts {
            gamma: cut(self.cuts.gamma, CutRole::Gamma)?,
            threshold: cut(self.cuts.threshold, CutRole::Threshold)?,
            punch_through: cut(self.cuts.punch_through, CutRole::PunchThrough)?,
            mass: cut(self.cuts.mass, CutRole::Mass)?,
        };

        let grid = IdentificationGrid::new(kind.clone(), lines)?.with_cuts(cuts);
        Ok(match self.intervals {
            Some(IntervalsConfig { kind, sets }) => grid.with_interval_sets(
                sets.into_iter()
                    .map(|set| IntervalSet::new(set.z, kind, set.intervals)),
            ),
            None => grid,
        })
    }
}

/// What a layer named in an event is made of.
#[derive(Debug, Clone)]
pub struct LayerTemplate {
    model: Arc<dyn EnergyLossModel>,
    direction: Direction,
}

/// A validated setup, ready to reconstruct events.
#[derive(Debug, Clone)]
pub struct Setup {
    layers: BTreeMap<String, LayerTemplate>,
    telescopes: BTreeMap<String, IdentificationTelescope>,
    pipeline: ParticlePipeline,
}

impl Setup {
    pub fn from_json(json: &str, settings: ReconstructionSettings) -> Result<Self, SetupError> {
        Self::new(serde_json::from_str(json)?, settings)
    }

    pub fn new(config: SetupConfig, settings: ReconstructionSettings) -> Result<Self, SetupError> {
        let mut layers = BTreeMap::new();
        for layer in config.layers {
            let template = LayerTemplate {
                model: layer.model.build(&layer.name)?,
                direction: layer.direction,
            };
            match layers.entry(layer.name) {
                Entry::Vacant(entry) => {
                    entry.insert(template);
                }
                Entry::Occupied(entry) => {
                    return Err(SetupError::DuplicateLayer(entry.key().clone()));
                }
            }
        }

        let mut grids = GridRegistry::default();
        for grid in config.grids {
            let grid = grid.build()?;
            let kind = grid.kind().to_owned();
            if grids.insert(grid).is_some() {
                return Err(SetupError::DuplicateGrid(kind));
            }
        }

        let mut telescopes = BTreeMap::new();
        for telescope in config.telescopes {
            for source in [&telescope.x, &telescope.y] {
                if !layers.contains_key(&source.layer) {
                    return Err(SetupError::UnknownLayer {
                        telescope: telescope.label.clone(),
                        layer: source.layer.clone(),
                    });
                }
            }
            if !grids.contains(&telescope.kind) {
                return Err(SetupError::UnknownKind {
                    telescope: telescope.label.clone(),
                    kind: telescope.kind.clone(),
                });
            }
            match telescopes.entry(telescope.label.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(telescope);
                }
                Entry::Occupied(entry) => {
                    return Err(SetupError::DuplicateTelescope(entry.key().clone()));
                }
            }
        }

        for rule in &config.rules.neutral_fallback {
            for kind in [&rule.from, &rule.to] {
                if !grids.contains(kind) {
                    warn!(
                        "Neutral fallback {} -> {} names kind {kind} which has no grid",
                        rule.from, rule.to
                    );
                }
            }
        }

        let geometry: Arc<dyn ArrayGeometry> = match config.target {
            Some(target) => Arc::new(ThinTarget::new(target.build("target")?)),
            None => Arc::new(NoTarget),
        };
        info!(
            "Setup: {} layers, {} grids, {} telescopes",
            layers.len(),
            grids.len(),
            telescopes.len()
        );
        let pipeline = ParticlePipeline::new(
            Identifier::new(grids, config.rules),
            TelescopeEnergyReconstructor::new(settings, geometry),
        );
        Ok(Self {
            layers,
            telescopes,
            pipeline,
        })
    }

    /// An uncalibrated instance of the named layer, for one event.
    pub fn layer(&self, name: &str) -> Option<DetectorLayer> {
        self.layers.get(name).map(|template| {
            DetectorLayer::new(name, template.model.clone()).with_direction(template.direction)
        })
    }

    pub fn telescope(&self, label: &str) -> Option<&IdentificationTelescope> {
        self.telescopes.get(label)
    }

    pub fn pipeline(&self) -> &ParticlePipeline {
        &self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::IntervalError, grid::GridCode};

    const SETUP: &str = r#"
    {
        "layers": [
            { "name": "SI_0101", "model": { "model-type": "range", "thickness": 35.0, "k": 3.0, "beta": 1.75 },
              "direction": { "theta": 12.5, "phi": 45.0 } },
            { "name": "CSI_0101", "model": { "model-type": "null" } }
        ],
        "grids": [{
            "kind": "Si-CsI",
            "lines": [
                { "z": 1, "points": [[0, 10], [100, 10]] },
                { "z": 2, "points": [[0, 20], [100, 20]] },
                { "z": 3, "points": [[0, 30], [100, 30]] }
            ],
            "cuts": {
                "gamma": { "side": "below", "points": [[0, 5], [100, 5]] }
            },
            "intervals": {
                "type": "discrete-interval",
                "sets": [
                    { "z": 2, "intervals": [
                        { "a": 3, "pid": 1.9, "pid-min": 1.85, "pid-max": 1.95 },
                        { "a": 4, "pid": 2.0, "pid-min": 1.95, "pid-max": 2.05 }
                    ] },
                    { "z": 3, "intervals": [
                        { "a": 6, "pid": 3.2, "pid-min": 3.0, "pid-max": 3.1 }
                    ] }
                ]
            }
        }],
        "telescopes": [{
            "label": "SI_CSI_0101",
            "kind": "Si-CsI",
            "x": { "layer": "CSI_0101", "signal": "Energy" },
            "y": { "layer": "SI_0101", "signal": "PG" }
        }],
        "rules": { "promote-minimum-z": false }
    }
    "#;

    #[test]
    fn parses_and_validates_a_setup() {
        let setup = Setup::from_json(SETUP, Default::default()).unwrap();

        let layer = setup.layer("SI_0101").unwrap();
        assert_eq!(layer.name(), "SI_0101");
        assert!(!layer.is_calibrated());
        assert_eq!(layer.direction().theta, 12.5);
        assert!(layer.punch_through_energy(2, 4) > 0.0);
        assert_eq!(
            setup
                .layer("CSI_0101")
                .map(|layer| layer.punch_through_energy(2, 4)),
            Some(0.0)
        );
        assert!(setup.layer("SI_0202").is_none());

        let telescope = setup.telescope("SI_CSI_0101").unwrap();
        assert_eq!(telescope.y.key(), "SI_0101.PG");

        let grid = setup.pipeline().identifier().grids().get("Si-CsI").unwrap();
        assert_eq!(grid.z_range(), (1, 3));
        assert_eq!(grid.classify(50.0, 2.0).code, GridCode::Gamma);
        assert!(grid.interval_set(2).is_some());
        // The Z = 3 table has its centre outside its interval.
        assert!(grid.interval_set(3).is_none());
        assert!(matches!(
            grid.load_errors(),
            [IntervalError::CentreOutside { z: 3, a: 6, .. }]
        ));
        assert_eq!(setup.pipeline().reconstructor().settings().chi_square_threshold, 10.0);
    }

    fn modified(from: &str, to: &str) -> Result<Setup, SetupError> {
        Setup::from_json(&SETUP.replacen(from, to, 1), Default::default())
    }

    #[test]
    fn telescope_must_read_known_layers() {
        let error = modified(r#""layer": "SI_0101""#, r#""layer": "SI_0102""#).err();
        assert!(matches!(error, Some(SetupError::UnknownLayer { layer, .. }) if layer == "SI_0102"));
    }

    #[test]
    fn telescope_kind_must_have_a_grid() {
        let error = modified(r#""kind": "Si-CsI","#, r#""kind": "Si-Si","#).err();
        assert!(matches!(error, Some(SetupError::UnknownKind { kind, .. }) if kind == "Si-CsI"));
    }

    #[test]
    fn layer_names_are_unique() {
        let error = modified(r#""name": "CSI_0101""#, r#""name": "SI_0101""#).err();
        assert!(matches!(error, Some(SetupError::DuplicateLayer(name)) if name == "SI_0101"));
    }

    #[test]
    fn range_model_parameters_must_be_positive() {
        let error = modified(r#""thickness": 35.0"#, r#""thickness": -35.0"#).err();
        assert!(matches!(error, Some(SetupError::InvalidModel { layer, .. }) if layer == "SI_0101"));
    }

    #[test]
    fn malformed_lines_are_reported_with_their_grid() {
        let error = modified("[[0, 30], [100, 30]]", "[[0, 30]]").err();
        assert!(matches!(
            error,
            Some(SetupError::Grid(GridError::Line { z: 3, .. }))
        ));

        let error = modified("[[0, 5], [100, 5]]", "[[0, 5], [0, 5]]").err();
        assert!(matches!(
            error,
            Some(SetupError::Grid(GridError::Cut { role: CutRole::Gamma, .. }))
        ));
    }

    #[test]
    fn unknown_model_type_is_a_parse_error() {
        let error = modified(r#""model-type": "null""#, r#""model-type": "bethe""#).err();
        assert!(matches!(error, Some(SetupError::Json(_))));
    }

    #[test]
    fn half_target_is_optional() {
        let with_target = SETUP.replacen(
            r#""rules""#,
            r#""target": { "model-type": "range", "thickness": 0.5, "k": 3.0, "beta": 1.75 }, "rules""#,
            1,
        );
        assert!(Setup::from_json(&with_target, Default::default()).is_ok());
    }
}
