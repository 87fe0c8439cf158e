//! Assigns (Z, A) to a candidate from the grids of the telescopes its
//! trajectory crosses.
use crate::{
    grid::{GridCode, GridIdentification, IdentificationGrid},
    particle::{IdentificationState, ParticleCandidate},
    trajectory::{IdentificationTelescope, Trajectory},
};
use serde::Deserialize;
use std::collections::BTreeMap;
use telescope_common::{AtomicNumber, MassNumber, Real};
use tracing::{debug, instrument, trace};

/// Identification grids by telescope kind.
#[derive(Debug, Clone, Default)]
pub struct GridRegistry {
    grids: BTreeMap<String, IdentificationGrid>,
}

impl GridRegistry {
    /// Returns the grid previously registered for the same kind, if any.
    pub fn insert(&mut self, grid: IdentificationGrid) -> Option<IdentificationGrid> {
        self.grids.insert(grid.kind().to_owned(), grid)
    }

    pub fn get(&self, kind: &str) -> Option<&IdentificationGrid> {
        self.grids.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.grids.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}

impl FromIterator<IdentificationGrid> for GridRegistry {
    fn from_iter<T: IntoIterator<Item = IdentificationGrid>>(iter: T) -> Self {
        let mut registry = Self::default();
        for grid in iter {
            registry.insert(grid);
        }
        registry
    }
}

/// When a telescope of kind `from` sees a gamma, try the telescope of kind
/// `to` crossed by the same particle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NeutralFallback {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IdentificationRules {
    #[serde(default)]
    pub neutral_fallback: Vec<NeutralFallback>,
    /// Identify otherwise unidentified candidates with the lower bound on Z
    /// given by another telescope.
    #[serde(default = "default_promote_minimum_z")]
    pub promote_minimum_z: bool,
}

fn default_promote_minimum_z() -> bool {
    true
}

impl Default for IdentificationRules {
    fn default() -> Self {
        Self {
            neutral_fallback: Vec::new(),
            promote_minimum_z: default_promote_minimum_z(),
        }
    }
}

impl IdentificationRules {
    fn fallback_for(&self, kind: &str) -> Option<&str> {
        self.neutral_fallback
            .iter()
            .find(|rule| rule.from == kind)
            .map(|rule| rule.to.as_str())
    }
}

/// One telescope's reading of the candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct TelescopeAttempt {
    pub telescope: String,
    pub kind: String,
    pub x: Real,
    pub y: Real,
    pub identification: GridIdentification,
}

impl TelescopeAttempt {
    fn code(&self) -> GridCode {
        self.identification.code
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentificationOutcome {
    pub z: AtomicNumber,
    pub a: Option<MassNumber>,
    pub code: Option<GridCode>,
    pub telescope: Option<String>,
    pub kind: Option<String>,
    pub state: IdentificationState,
    /// Every telescope consulted, in the order they were tried.
    pub attempts: Vec<TelescopeAttempt>,
}

impl IdentificationOutcome {
    pub fn is_identified(&self) -> bool {
        matches!(
            self.state,
            IdentificationState::Accepted | IdentificationState::Overridden
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Identifier {
    grids: GridRegistry,
    rules: IdentificationRules,
}

impl Identifier {
    pub fn new(grids: GridRegistry, rules: IdentificationRules) -> Self {
        Self { grids, rules }
    }

    pub fn grids(&self) -> &GridRegistry {
        &self.grids
    }

    fn attempt(
        &self,
        telescope: &IdentificationTelescope,
        trajectory: &Trajectory,
    ) -> Option<TelescopeAttempt> {
        let Some(grid) = self.grids.get(&telescope.kind) else {
            debug!("No grid for telescope {} of kind {}", telescope.label, telescope.kind);
            return None;
        };
        let (Some(x), Some(y)) = (trajectory.signal(&telescope.x), trajectory.signal(&telescope.y))
        else {
            debug!("Telescope {} is missing a signal", telescope.label);
            return None;
        };
        let identification = grid.identify(x, y);
        trace!(
            "Telescope {}: Z = {}, code = {}",
            telescope.label, identification.z, identification.code
        );
        Some(TelescopeAttempt {
            telescope: telescope.label.clone(),
            kind: telescope.kind.clone(),
            x,
            y,
            identification,
        })
    }

    /// Tries the telescopes from the stopping layer outward and keeps the
    /// first acceptable result, then applies the override rules.
    #[instrument(skip_all, fields(z, code, state))]
    pub fn identify(
        &self,
        candidate: &mut ParticleCandidate,
        trajectory: &Trajectory,
    ) -> IdentificationOutcome {
        let mut attempts = Vec::<TelescopeAttempt>::new();
        let mut chosen = None;
        let mut gamma = None;
        for telescope in trajectory.telescopes() {
            let Some(attempt) = self.attempt(telescope, trajectory) else {
                continue;
            };
            let code = attempt.code();
            attempts.push(attempt);
            if code.is_acceptable() {
                chosen = Some(attempts.len() - 1);
                break;
            }
            if code == GridCode::Gamma {
                gamma = Some(attempts.len() - 1);
                break;
            }
        }

        // The attempt reported when nothing is accepted.
        let deciding = chosen.or(gamma).unwrap_or_default();
        let Some(deciding_code) = attempts.get(deciding).map(TelescopeAttempt::code) else {
            let outcome = IdentificationOutcome {
                z: 0,
                a: None,
                code: None,
                telescope: None,
                kind: None,
                state: IdentificationState::Unattempted,
                attempts,
            };
            write_back(candidate, &outcome);
            return outcome;
        };
        let mut state = IdentificationState::Attempted(deciding_code);

        let fallback_kind = gamma
            .and_then(|index| attempts.get(index))
            .and_then(|attempt| self.rules.fallback_for(&attempt.kind));
        if let Some(fallback_kind) = fallback_kind {
            let fallback = trajectory
                .telescopes()
                .filter(|telescope| telescope.kind == fallback_kind)
                .filter(|telescope| !attempts.iter().any(|a| a.telescope == telescope.label))
                .find_map(|telescope| self.attempt(telescope, trajectory));
            if let Some(fallback) = fallback {
                let acceptable = fallback.code().is_acceptable();
                attempts.push(fallback);
                if acceptable {
                    debug!("Gamma overridden by a telescope of kind {fallback_kind}");
                    chosen = Some(attempts.len() - 1);
                    state = IdentificationState::Overridden;
                }
            }
        }

        if chosen.is_none() && self.rules.promote_minimum_z {
            if let Some(index) = attempts
                .iter()
                .skip(1)
                .position(|attempt| attempt.code().is_minimum_z())
            {
                chosen = Some(index + 1);
                state = IdentificationState::Overridden;
            }
        }

        let state = state.settle();
        let reported = chosen.unwrap_or(deciding);
        let (z, a, code) = attempts
            .get(reported)
            .map(|attempt| {
                let identification = &attempt.identification;
                let a = identification.a.filter(|_| !identification.code.is_minimum_z());
                (identification.z, a, Some(identification.code))
            })
            .unwrap_or_default();
        let result = chosen.and_then(|index| attempts.get(index));
        let outcome = IdentificationOutcome {
            z,
            a,
            code,
            telescope: result.map(|attempt| attempt.telescope.clone()),
            kind: result.map(|attempt| attempt.kind.clone()),
            state,
            attempts,
        };
        write_back(candidate, &outcome);

        let span = tracing::Span::current();
        span.record("z", outcome.z);
        span.record("code", outcome.code.map(|code| code.code()));
        span.record("state", tracing::field::debug(&outcome.state));
        outcome
    }
}

/// Per-telescope values written for each attempt.
const ATTEMPT_SIGNALS: [&str; 5] = ["X", "Y", "PID", "Code", "MassCode"];

fn write_back(candidate: &mut ParticleCandidate, outcome: &IdentificationOutcome) {
    candidate.parameters.remove_signals(&ATTEMPT_SIGNALS);
    for attempt in &outcome.attempts {
        let identification = &attempt.identification;
        candidate.parameters.set(&attempt.telescope, "X", attempt.x);
        candidate.parameters.set(&attempt.telescope, "Y", attempt.y);
        if let Some(pid) = identification.pid {
            candidate.parameters.set(&attempt.telescope, "PID", pid);
        }
        candidate.parameters.set(
            &attempt.telescope,
            "Code",
            identification.code.code() as Real,
        );
        if let Some(mass_code) = identification.mass_code {
            candidate
                .parameters
                .set(&attempt.telescope, "MassCode", mass_code.code() as Real);
        }
    }

    let identified = outcome.is_identified();
    let result = outcome
        .telescope
        .as_deref()
        .and_then(|label| outcome.attempts.iter().find(|attempt| attempt.telescope == label));
    candidate.z = outcome.z;
    candidate.a = outcome.a.unwrap_or_default();
    candidate.mass_measured = identified && outcome.a.is_some();
    candidate.pid = result.and_then(|attempt| attempt.identification.pid);
    candidate.identification_quality = outcome.code;
    candidate.identifying_telescope = outcome.telescope.clone();
    candidate.identification_state = outcome.state;
    candidate.is_identified = identified;
}
