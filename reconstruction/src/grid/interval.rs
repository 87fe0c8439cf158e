//! Per-Z tables refining the integer mass from the continuous PID value.
use super::{code::MassCode, line::Polyline};
use crate::error::IntervalError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use telescope_common::{AtomicNumber, MassNumber, Real};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntervalKind {
    /// A is the isotope whose interval contains the PID.
    DiscreteInterval,
    /// A is read from the fitted PID(A) relation only.
    ContinuousFit,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MassInterval {
    pub a: MassNumber,
    pub pid: Real,
    pub pid_min: Real,
    pub pid_max: Real,
}

impl MassInterval {
    pub fn contains(&self, pid: Real) -> bool {
        self.pid_min <= pid && pid < self.pid_max
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassAssignment {
    pub a: MassNumber,
    /// Continuous estimate from the fitted relation.
    pub a_real: Real,
    pub code: MassCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalSet {
    z: AtomicNumber,
    kind: IntervalKind,
    intervals: Vec<MassInterval>,
    /// A as a function of PID through the interval centres.
    fit: Option<Polyline>,
}

impl IntervalSet {
    pub fn new(
        z: AtomicNumber,
        kind: IntervalKind,
        intervals: Vec<MassInterval>,
    ) -> Result<Self, IntervalError> {
        if intervals.is_empty() {
            return Err(IntervalError::Empty(z));
        }
        for interval in &intervals {
            // Written so that NaN fails too.
            if !(interval.pid_min < interval.pid && interval.pid < interval.pid_max) {
                return Err(IntervalError::CentreOutside {
                    z,
                    a: interval.a,
                    pid: interval.pid,
                    pid_min: interval.pid_min,
                    pid_max: interval.pid_max,
                });
            }
        }
        for (lower, upper) in intervals.iter().tuple_windows() {
            if upper.a <= lower.a || upper.pid <= lower.pid {
                return Err(IntervalError::Unordered { z, a: upper.a });
            }
            if kind == IntervalKind::DiscreteInterval && upper.pid_min < lower.pid_max {
                return Err(IntervalError::Overlap {
                    z,
                    a: lower.a,
                    next_a: upper.a,
                });
            }
        }
        let fit = Polyline::new(
            intervals
                .iter()
                .map(|interval| (interval.pid, interval.a as Real))
                .collect(),
        )
        .ok();
        Ok(Self {
            z,
            kind,
            intervals,
            fit,
        })
    }

    pub fn z(&self) -> AtomicNumber {
        self.z
    }

    pub fn kind(&self) -> IntervalKind {
        self.kind
    }

    pub fn intervals(&self) -> &[MassInterval] {
        &self.intervals
    }

    /// Lowest and highest PID covered by the intervals of this Z.
    pub fn span(&self) -> (Real, Real) {
        self.intervals.iter().fold(
            (Real::INFINITY, Real::NEG_INFINITY),
            |(min, max), interval| (min.min(interval.pid_min), max.max(interval.pid_max)),
        )
    }

    pub fn in_span(&self, pid: Real) -> bool {
        let (min, max) = self.span();
        min <= pid && pid < max
    }

    /// Continuous mass estimate for a PID value.
    pub fn mass_estimate(&self, pid: Real) -> Real {
        match &self.fit {
            Some(fit) => fit.eval(pid),
            None => self
                .intervals
                .first()
                .map(|interval| interval.a as Real)
                .unwrap_or_default(),
        }
    }

    pub fn containing(&self, pid: Real) -> impl Iterator<Item = &MassInterval> {
        self.intervals
            .iter()
            .filter(move |interval| interval.contains(pid))
    }

    pub fn mass(&self, pid: Real) -> MassAssignment {
        let a_real = self.mass_estimate(pid);
        let rounded = a_real.round().max(1.0) as MassNumber;
        let outside = || {
            if self.in_span(pid) {
                MassCode::WithinSpan
            } else {
                MassCode::OutsideSpan
            }
        };
        match self.kind {
            IntervalKind::DiscreteInterval => {
                match self.containing(pid).exactly_one() {
                    Ok(interval) => MassAssignment {
                        a: interval.a,
                        a_real,
                        code: MassCode::Resolved,
                    },
                    Err(_) => MassAssignment {
                        a: rounded,
                        a_real,
                        code: outside(),
                    },
                }
            }
            IntervalKind::ContinuousFit => MassAssignment {
                a: rounded,
                a_real,
                code: if self.in_span(pid) {
                    MassCode::Resolved
                } else {
                    MassCode::OutsideSpan
                },
            },
        }
    }
}
