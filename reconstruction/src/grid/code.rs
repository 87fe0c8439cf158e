use serde::Serialize;

/// Outcome of locating a point in an identification grid.
///
/// On a grid of charge lines (one line per Z) codes 1–3 describe an ambiguity
/// of Z. On a grid of isotope lines (one line per (Z, A)) they describe an
/// ambiguity between neighbouring isotope lines, usually of A at fixed Z.
/// Codes 4 and 5 are equivalent; both labels are kept so that results stay
/// comparable with older analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum GridCode {
    #[strum(to_string = "unambiguous")]
    Unambiguous,
    /// The true line could be the next one above.
    #[strum(to_string = "may be higher")]
    MayBeHigher,
    /// The true line could be the next one below.
    #[strum(to_string = "may be lower")]
    MayBeLower,
    /// The point is as close to the line above as to the line below.
    #[strum(to_string = "ambiguous")]
    Ambiguous,
    /// Between two lines of different Z, too far from the lower one.
    #[strum(to_string = "too far from lower line")]
    TooFarFromLower,
    /// Between two lines of different Z, too far from the upper one.
    #[strum(to_string = "too far from upper line")]
    TooFarFromUpper,
    /// Below the first line, Z taken from that line.
    #[strum(to_string = "below first line")]
    BelowFirstLine,
    /// Above the last line, Z taken from that line.
    #[strum(to_string = "above last line")]
    AboveLastLine,
    #[strum(to_string = "out of range")]
    OutOfRange,
    /// Beyond the punch-through cut: Z is only a lower bound.
    #[strum(to_string = "minimum Z (punch-through)")]
    ZMinPunchThrough,
    /// Not a charged-particle track.
    #[strum(to_string = "gamma")]
    Gamma,
    /// Below the detection threshold cut: Z is only a lower bound.
    #[strum(to_string = "minimum Z (threshold)")]
    ZMinBelowThreshold,
}

impl GridCode {
    pub fn code(&self) -> u8 {
        match self {
            Self::Unambiguous => 0,
            Self::MayBeHigher => 1,
            Self::MayBeLower => 2,
            Self::Ambiguous => 3,
            Self::TooFarFromLower => 4,
            Self::TooFarFromUpper => 5,
            Self::BelowFirstLine => 6,
            Self::AboveLastLine => 7,
            Self::OutOfRange => 8,
            Self::ZMinPunchThrough => 9,
            Self::Gamma => 10,
            Self::ZMinBelowThreshold => 11,
        }
    }

    /// Z can be used: a located point, or a boundary estimate.
    pub fn is_acceptable(&self) -> bool {
        let code = self.code();
        code < 4 || code == 6 || code == 7
    }

    /// Z is good enough to go on and look for A.
    pub fn allows_mass(&self) -> bool {
        let code = self.code();
        code < 4 || code == 7
    }

    pub fn is_minimum_z(&self) -> bool {
        matches!(self, Self::ZMinPunchThrough | Self::ZMinBelowThreshold)
    }
}

/// Outcome of refining A from the PID value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum MassCode {
    /// The PID lies in exactly one mass interval, or inside the fitted domain.
    #[strum(to_string = "resolved")]
    Resolved,
    /// A rounded from the continuous estimate, PID within the Z's intervals.
    #[strum(to_string = "within span")]
    WithinSpan,
    /// A rounded from the continuous estimate, PID outside every interval of Z.
    #[strum(to_string = "outside span")]
    OutsideSpan,
}

impl MassCode {
    pub fn code(&self) -> u8 {
        match self {
            Self::Resolved => 0,
            Self::WithinSpan => 3,
            Self::OutsideSpan => 4,
        }
    }
}
