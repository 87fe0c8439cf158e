//! Identification grids: families of calibration lines in a two-signal
//! plane, used to read Z (and A) off a measured point.
pub mod code;
pub mod interval;
pub mod line;

pub use code::{GridCode, MassCode};
pub use interval::{IntervalKind, IntervalSet, MassAssignment, MassInterval};
pub use line::{CutSide, IdentificationCut, IdentificationLine};

use crate::error::{GridError, IntervalError};
use itertools::Itertools;
use std::collections::BTreeMap;
use telescope_common::{AtomicNumber, MassNumber, Real};
use tracing::warn;

/// Half-width, as a fraction of the gap between two lines, of the band
/// around the midpoint where neither line is nearer.
const MIDPOINT_HALF_WIDTH: Real = 0.05;
/// Fraction of the gap beyond which the other line becomes plausible.
const SLIGHT_AMBIGUITY: Real = 0.25;
/// Fraction of the nearest line's own band beyond which a point between
/// lines of different Z is not trusted.
const TOO_FAR: Real = 0.5;

/// Optional cut lines refining the classification of a grid.
#[derive(Debug, Clone, Default)]
pub struct GridCuts {
    /// Selects the neutral (gamma) pseudo-category.
    pub gamma: Option<IdentificationCut>,
    /// Selects points under the detection threshold of the residual layer.
    pub threshold: Option<IdentificationCut>,
    /// Selects points of particles punching through the residual layer.
    pub punch_through: Option<IdentificationCut>,
    /// Selects the region where mass identification is allowed.
    pub mass: Option<IdentificationCut>,
}

/// Where a point lies with respect to the lines of a grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridClassification {
    pub z: AtomicNumber,
    /// Set for isotope lines.
    pub a: Option<MassNumber>,
    pub pid: Option<Real>,
    pub code: GridCode,
}

impl GridClassification {
    fn unlocated(code: GridCode) -> Self {
        Self {
            z: 0,
            a: None,
            pid: None,
            code,
        }
    }
}

/// A classification completed with the mass refinement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridIdentification {
    pub z: AtomicNumber,
    pub a: Option<MassNumber>,
    pub a_real: Option<Real>,
    pub pid: Option<Real>,
    pub code: GridCode,
    /// Set when A was refined from the interval sets.
    pub mass_code: Option<MassCode>,
}

impl GridIdentification {
    pub fn mass_measured(&self) -> bool {
        self.a.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct IdentificationGrid {
    kind: String,
    /// Sorted bottom to top.
    lines: Vec<IdentificationLine>,
    cuts: GridCuts,
    intervals: BTreeMap<AtomicNumber, IntervalSet>,
    x_range: (Real, Real),
    z_range: (AtomicNumber, AtomicNumber),
    load_errors: Vec<IntervalError>,
}

impl IdentificationGrid {
    pub fn new(kind: impl Into<String>, lines: Vec<IdentificationLine>) -> Result<Self, GridError> {
        let kind = kind.into();
        if lines.len() < 2 {
            return Err(GridError::TooFewLines {
                kind,
                count: lines.len(),
            });
        }
        let ranges = lines.iter().map(IdentificationLine::x_range);
        let x_range = ranges.clone().fold(
            (Real::INFINITY, Real::NEG_INFINITY),
            |(min, max), (start, end)| (min.min(start), max.max(end)),
        );
        let common = ranges.fold(
            (Real::NEG_INFINITY, Real::INFINITY),
            |(min, max), (start, end)| (min.max(start), max.min(end)),
        );
        let reference_x = if common.0 <= common.1 {
            0.5 * (common.0 + common.1)
        } else {
            0.5 * (x_range.0 + x_range.1)
        };

        let mut lines = lines;
        lines.sort_by(|first, second| {
            first
                .y_at(reference_x)
                .total_cmp(&second.y_at(reference_x))
                .then(first.z().cmp(&second.z()))
                .then(first.a().cmp(&second.a()))
        });
        check_not_crossing(&kind, &lines, x_range)?;
        let z_range = lines.iter().fold((AtomicNumber::MAX, 0), |(min, max), line| {
            (min.min(line.z()), max.max(line.z()))
        });

        Ok(Self {
            kind,
            lines,
            cuts: Default::default(),
            intervals: Default::default(),
            x_range,
            z_range,
            load_errors: Vec::new(),
        })
    }

    pub fn with_cuts(mut self, cuts: GridCuts) -> Self {
        self.cuts = cuts;
        self
    }

    /// Adds the mass tables. Malformed tables are left out of the grid and
    /// kept in [Self::load_errors].
    pub fn with_interval_sets(
        mut self,
        sets: impl IntoIterator<Item = Result<IntervalSet, IntervalError>>,
    ) -> Self {
        for set in sets {
            match set {
                Ok(set) => {
                    if let Some(previous) = self.intervals.insert(set.z(), set) {
                        warn!(
                            "Grid {}: interval set for Z = {} given twice, keeping the last",
                            self.kind,
                            previous.z()
                        );
                    }
                }
                Err(e) => {
                    warn!("Grid {}: interval set excluded: {e}", self.kind);
                    self.load_errors.push(e);
                }
            }
        }
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn lines(&self) -> &[IdentificationLine] {
        &self.lines
    }

    pub fn z_range(&self) -> (AtomicNumber, AtomicNumber) {
        self.z_range
    }

    pub fn x_range(&self) -> (Real, Real) {
        self.x_range
    }

    pub fn interval_set(&self, z: AtomicNumber) -> Option<&IntervalSet> {
        self.intervals.get(&z)
    }

    pub fn load_errors(&self) -> &[IntervalError] {
        &self.load_errors
    }

    /// Locates `(x, y)` among the lines.
    pub fn classify(&self, x: Real, y: Real) -> GridClassification {
        if self
            .cuts
            .gamma
            .as_ref()
            .is_some_and(|gamma| gamma.contains(x, y))
        {
            return GridClassification::unlocated(GridCode::Gamma);
        }
        if !(x.is_finite() && y.is_finite() && self.x_range.0 <= x && x <= self.x_range.1) {
            return GridClassification::unlocated(GridCode::OutOfRange);
        }

        let ys: Vec<Real> = self.lines.iter().map(|line| line.y_at(x)).collect();
        let below = ys.partition_point(|&line_y| line_y <= y);
        let on_last_line = ys.last().is_some_and(|&last| last == y);
        let located = match below {
            0 => self.outside(&ys, y, 0, GridCode::BelowFirstLine),
            n if n == ys.len() && on_last_line => self.between(&ys, y, n - 2),
            n if n == ys.len() => self.outside(&ys, y, n - 2, GridCode::AboveLastLine),
            n => self.between(&ys, y, n - 1),
        };
        let Some(mut located) = located else {
            return GridClassification::unlocated(GridCode::OutOfRange);
        };

        if self
            .cuts
            .threshold
            .as_ref()
            .is_some_and(|cut| cut.contains(x, y))
        {
            located.code = GridCode::ZMinBelowThreshold;
        } else if self
            .cuts
            .punch_through
            .as_ref()
            .is_some_and(|cut| cut.contains(x, y))
        {
            located.code = GridCode::ZMinPunchThrough;
        }
        located
    }

    /// Classifies `(x, y)` then refines A where the grid allows it.
    pub fn identify(&self, x: Real, y: Real) -> GridIdentification {
        let GridClassification { z, a, pid, code } = self.classify(x, y);
        let mut identification = GridIdentification {
            z,
            a: None,
            a_real: None,
            pid,
            code,
            mass_code: None,
        };
        if !code.allows_mass() {
            return identification;
        }
        if a.is_some() {
            identification.a = a;
            identification.a_real = a.map(|a| a as Real);
            return identification;
        }
        let (Some(set), Some(pid)) = (self.intervals.get(&z), pid) else {
            return identification;
        };
        if self.cuts.mass.as_ref().is_some_and(|cut| !cut.contains(x, y)) {
            return identification;
        }
        let mass = set.mass(pid);
        identification.a = Some(mass.a);
        identification.a_real = Some(mass.a_real);
        identification.mass_code = Some(mass.code);
        identification
    }

    fn pid_between(&self, lower: usize, fraction: Real) -> Option<Real> {
        let (inf, sup) = (self.lines.get(lower)?, self.lines.get(lower + 1)?);
        Some(inf.pid() + fraction * (sup.pid() - inf.pid()))
    }

    /// Outside the first or last line: accepted within one band width of
    /// that line. `lower` indexes the outermost pair of lines.
    fn outside(
        &self,
        ys: &[Real],
        y: Real,
        lower: usize,
        code: GridCode,
    ) -> Option<GridClassification> {
        let (y_inf, y_sup) = (*ys.get(lower)?, *ys.get(lower + 1)?);
        let band = y_sup - y_inf;
        let (nearest, distance) = match code {
            GridCode::BelowFirstLine => (lower, y_inf - y),
            _ => (lower + 1, y - y_sup),
        };
        if band <= 0.0 || distance > band {
            return None;
        }
        let line = self.lines.get(nearest)?;
        Some(GridClassification {
            z: line.z(),
            a: line.a(),
            pid: self.pid_between(lower, (y - y_inf) / band),
            code,
        })
    }

    fn between(&self, ys: &[Real], y: Real, lower: usize) -> Option<GridClassification> {
        let upper = lower + 1;
        let (inf, sup) = (self.lines.get(lower)?, self.lines.get(upper)?);
        let (y_inf, y_sup) = (*ys.get(lower)?, *ys.get(upper)?);
        let gap = y_sup - y_inf;
        if gap <= 0.0 {
            return Some(GridClassification {
                z: inf.z(),
                a: inf.a(),
                pid: Some(inf.pid()),
                code: GridCode::Unambiguous,
            });
        }
        let (d_inf, d_sup) = (y - y_inf, y_sup - y);
        let fraction = d_inf / gap;

        let (nearest, distance, own_band) = if d_inf <= d_sup {
            let band = lower
                .checked_sub(1)
                .and_then(|outer| ys.get(outer))
                .map(|y_outer| y_inf - y_outer);
            (inf, d_inf, band)
        } else {
            let band = ys.get(upper + 1).map(|y_outer| y_outer - y_sup);
            (sup, d_sup, band)
        };

        let code = if inf.z() != sup.z() && own_band.is_some_and(|band| distance > TOO_FAR * band)
        {
            if d_inf <= d_sup {
                GridCode::TooFarFromLower
            } else {
                GridCode::TooFarFromUpper
            }
        } else if (fraction - 0.5).abs() < MIDPOINT_HALF_WIDTH {
            GridCode::Ambiguous
        } else if fraction < 0.5 {
            if fraction >= SLIGHT_AMBIGUITY {
                GridCode::MayBeHigher
            } else {
                GridCode::Unambiguous
            }
        } else if fraction <= 1.0 - SLIGHT_AMBIGUITY {
            GridCode::MayBeLower
        } else {
            GridCode::Unambiguous
        };

        Some(GridClassification {
            z: nearest.z(),
            a: nearest.a(),
            pid: self.pid_between(lower, fraction),
            code,
        })
    }
}

/// Lines sorted at one abscissa must stay in that order over the whole
/// covered range, or the embracing pair of a point is not well defined.
/// Lines are linear between vertices, so checking every vertex suffices.
fn check_not_crossing(
    kind: &str,
    lines: &[IdentificationLine],
    x_range: (Real, Real),
) -> Result<(), GridError> {
    let vertices = lines
        .iter()
        .flat_map(IdentificationLine::vertices)
        .chain([x_range.0, x_range.1])
        .filter(|x| (x_range.0..=x_range.1).contains(x));
    for x in vertices {
        if let Some((lower, upper)) = lines
            .iter()
            .tuple_windows()
            .find(|(lower, upper)| lower.y_at(x) > upper.y_at(x))
        {
            return Err(GridError::CrossingLines {
                kind: kind.to_owned(),
                lower: lower.z(),
                upper: upper.z(),
                x,
            });
        }
    }
    Ok(())
}
