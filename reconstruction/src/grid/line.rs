use crate::error::LineError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use telescope_common::{AtomicNumber, MassNumber, Real};

/// Piecewise-linear curve through points of strictly increasing abscissa.
/// Evaluation beyond the end points extends the first or last segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    points: Vec<(Real, Real)>,
}

impl Polyline {
    pub fn new(points: Vec<(Real, Real)>) -> Result<Self, LineError> {
        if points.len() < 2 {
            return Err(LineError::TooFewPoints(points.len()));
        }
        if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(LineError::NotFinite);
        }
        if let Some(((x0, _), _)) = points
            .iter()
            .tuple_windows()
            .find(|((x0, _), (x1, _))| x1 <= x0)
        {
            return Err(LineError::NotIncreasing(*x0));
        }
        Ok(Self { points })
    }

    pub fn vertices(&self) -> impl Iterator<Item = Real> + '_ {
        self.points.iter().map(|(x, _)| *x)
    }

    pub fn x_range(&self) -> (Real, Real) {
        let first = self.points.first().map(|p| p.0).unwrap_or_default();
        let last = self.points.last().map(|p| p.0).unwrap_or_default();
        (first, last)
    }

    pub fn eval(&self, x: Real) -> Real {
        let segment = self
            .points
            .iter()
            .tuple_windows()
            .find(|(_, (x1, _))| x <= *x1)
            .or_else(|| self.points.iter().tuple_windows().last());
        match segment {
            Some(((x0, y0), (x1, y1))) => y0 + (y1 - y0) * (x - x0) / (x1 - x0),
            None => 0.0,
        }
    }
}

/// One calibration curve of an identification grid.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentificationLine {
    z: AtomicNumber,
    a: Option<MassNumber>,
    curve: Polyline,
}

impl IdentificationLine {
    pub fn new(
        z: AtomicNumber,
        a: Option<MassNumber>,
        points: Vec<(Real, Real)>,
    ) -> Result<Self, LineError> {
        Ok(Self {
            z,
            a,
            curve: Polyline::new(points)?,
        })
    }

    pub fn z(&self) -> AtomicNumber {
        self.z
    }

    pub fn a(&self) -> Option<MassNumber> {
        self.a
    }

    /// `Z` for charge lines, `Z + 0.1·(A − 2Z)` for isotope lines.
    pub fn pid(&self) -> Real {
        let z = self.z as Real;
        match self.a {
            Some(a) => z + 0.1 * (a as Real - 2.0 * z),
            None => z,
        }
    }

    pub fn x_range(&self) -> (Real, Real) {
        self.curve.x_range()
    }

    /// Abscissae of the points the line was drawn through.
    pub fn vertices(&self) -> impl Iterator<Item = Real> + '_ {
        self.curve.vertices()
    }

    pub fn y_at(&self, x: Real) -> Real {
        self.curve.eval(x)
    }
}

/// Which side of a cut line is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CutSide {
    Above,
    Below,
    Left,
    Right,
}

/// A line splitting the (x, y) plane. `Above`/`Below` cuts are curves in x,
/// `Left`/`Right` cuts are curves in y (their points are given as (x, y) but
/// must increase in y).
#[derive(Debug, Clone, PartialEq)]
pub struct IdentificationCut {
    side: CutSide,
    curve: Polyline,
}

impl IdentificationCut {
    pub fn new(side: CutSide, points: Vec<(Real, Real)>) -> Result<Self, LineError> {
        let curve = match side {
            CutSide::Above | CutSide::Below => Polyline::new(points)?,
            CutSide::Left | CutSide::Right => {
                Polyline::new(points.into_iter().map(|(x, y)| (y, x)).collect())?
            }
        };
        Ok(Self { side, curve })
    }

    pub fn side(&self) -> CutSide {
        self.side
    }

    pub fn contains(&self, x: Real, y: Real) -> bool {
        match self.side {
            CutSide::Above => y > self.curve.eval(x),
            CutSide::Below => y < self.curve.eval(x),
            CutSide::Left => x < self.curve.eval(y),
            CutSide::Right => x > self.curve.eval(y),
        }
    }
}
