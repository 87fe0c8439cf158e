use telescope_common::{AtomicNumber, MassNumber, Real};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LineError {
    #[error("A line needs at least two points, got {0}")]
    TooFewPoints(usize),
    #[error("Line points must be finite")]
    NotFinite,
    #[error("Line abscissae must increase strictly, not after {0}")]
    NotIncreasing(Real),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum IntervalError {
    #[error("Interval set for Z = {0} is empty")]
    Empty(AtomicNumber),
    #[error("Z = {z}, A = {a}: PID {pid} is not strictly inside [{pid_min}, {pid_max})")]
    CentreOutside {
        z: AtomicNumber,
        a: MassNumber,
        pid: Real,
        pid_min: Real,
        pid_max: Real,
    },
    #[error("Z = {z}: intervals are not in increasing order of A and PID at A = {a}")]
    Unordered { z: AtomicNumber, a: MassNumber },
    #[error("Z = {z}: intervals for A = {a} and A = {next_a} overlap")]
    Overlap {
        z: AtomicNumber,
        a: MassNumber,
        next_a: MassNumber,
    },
}

#[derive(Debug, strum::Display, PartialEq)]
pub enum CutRole {
    #[strum(to_string = "gamma")]
    Gamma,
    #[strum(to_string = "threshold")]
    Threshold,
    #[strum(to_string = "punch-through")]
    PunchThrough,
    #[strum(to_string = "mass")]
    Mass,
}

#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("Grid {kind} has {count} lines, at least two are needed")]
    TooFewLines { kind: String, count: usize },
    #[error("Grid {kind}, line Z = {z}: {source}")]
    Line {
        kind: String,
        z: AtomicNumber,
        source: LineError,
    },
    #[error("Grid {kind}: lines Z = {lower} and Z = {upper} cross at x = {x}")]
    CrossingLines {
        kind: String,
        lower: AtomicNumber,
        upper: AtomicNumber,
        x: Real,
    },
    #[error("Grid {kind}, {role} cut: {source}")]
    Cut {
        kind: String,
        role: CutRole,
        source: LineError,
    },
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("{0}")]
    Grid(#[from] GridError),
    #[error("Duplicate layer {0}")]
    DuplicateLayer(String),
    #[error("Duplicate grid for telescope kind {0}")]
    DuplicateGrid(String),
    #[error("Duplicate telescope {0}")]
    DuplicateTelescope(String),
    #[error("Telescope {telescope} reads unknown layer {layer}")]
    UnknownLayer { telescope: String, layer: String },
    #[error("Telescope {telescope} has no grid for kind {kind}")]
    UnknownKind { telescope: String, kind: String },
    #[error("Invalid energy-loss model for layer {layer}: {reason}")]
    InvalidModel { layer: String, reason: String },
    #[error("Cannot parse setup: {0}")]
    Json(#[from] serde_json::Error),
}
