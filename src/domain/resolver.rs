//! Candidate resolution: turns an instrument name and type into zero, one,
//! or an adjudicated-one canonical security.
//!
//! Exact lookup comes first. Failing that, the type's [`NameIndex`] is
//! searched and the ranked hits are fed through [`decide`], a fixed decision
//! table keyed on candidate count, top score and the score margin between
//! the top two. Whatever the table cannot settle goes to the
//! [`DisambiguationPolicy`].

use crate::domain::error::SecmasterError;
use crate::domain::security::{CanonicalSecurity, InstrumentType, search_key};
use crate::domain::similarity::{NameIndex, SimilarityIndex};
use crate::ports::disambiguation_port::DisambiguationPolicy;
use crate::ports::registry_port::RegistryPort;
use tracing::{debug, error, info, warn};

pub const DEFAULT_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub security: CanonicalSecurity,
    pub score: f64,
}

/// Renders candidates as `name (score), ...` for log lines and prompts.
pub fn describe(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(|c| format!("{} ({:.3})", c.security.name, c.score))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Matched(Candidate),
    /// Nothing usable; the caller may create a new instrument.
    NoCandidate,
    /// Declined by a policy that skips unresolved matches.
    Ambiguous(Vec<Candidate>),
}

/// Outcome of the decision table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept(usize),
    Reject,
    /// Ask the policy to confirm the single candidate.
    Confirm(usize),
    /// Ask the policy to pick among these candidates.
    Choose(Vec<usize>),
}

/// Decision table over candidates sorted best first.
///
/// | candidates | condition                          | decision   |
/// |-----------:|------------------------------------|------------|
/// | 0          |                                    | `Reject`   |
/// | 1          | score == 1.0                       | `Accept`   |
/// | 1          | score < 1.0                        | `Confirm`  |
/// | ≥2         | exactly one key equals the query's | `Accept`   |
/// | ≥2         | top − second ≥ `separation_margin` | `Accept`   |
/// | ≥2         | otherwise                          | `Choose`   |
pub fn decide(query: &str, candidates: &[Candidate], separation_margin: Option<f64>) -> Decision {
    match candidates {
        [] => Decision::Reject,
        [only] if only.score >= 1.0 => Decision::Accept(0),
        [_] => Decision::Confirm(0),
        [top, second, ..] => {
            let key = search_key(query);
            let exact: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| c.security.search_key == key)
                .map(|(i, _)| i)
                .collect();
            if let [only] = exact.as_slice() {
                return Decision::Accept(*only);
            }
            if separation_margin.is_some_and(|margin| top.score - second.score >= margin) {
                return Decision::Accept(0);
            }
            Decision::Choose((0..candidates.len()).collect())
        }
    }
}

pub struct CandidateResolver {
    index: SimilarityIndex,
    threshold: f64,
    separation_margin: Option<f64>,
}

impl CandidateResolver {
    pub fn new(threshold: f64, separation_margin: Option<f64>) -> Self {
        Self {
            index: SimilarityIndex::new(),
            threshold,
            separation_margin,
        }
    }

    /// Exact normalized-name lookup. Duplicate rows break the registry's
    /// uniqueness invariant and are reported as an integrity violation.
    pub fn resolve_exact(
        &self,
        registry: &dyn RegistryPort,
        name: &str,
        instrument_type: &InstrumentType,
    ) -> Result<Option<CanonicalSecurity>, SecmasterError> {
        let mut rows = registry.find_exact(name, instrument_type.id)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => {
                let ids: Vec<i64> = rows.iter().map(|s| s.id).collect();
                error!(
                    query = %name,
                    instrument_type = %instrument_type.name,
                    rows = ?ids,
                    "{} securities share one search key",
                    n
                );
                Err(SecmasterError::IntegrityViolation {
                    subject: format!("{} [{}]", name, instrument_type.name),
                    reason: format!("{n} securities share the search key {:?}", search_key(name)),
                })
            }
        }
    }

    /// Loads the type's full name index from the registry unless already
    /// built.
    pub fn ensure_partition(
        &mut self,
        registry: &dyn RegistryPort,
        instrument_type: &InstrumentType,
    ) -> Result<(), SecmasterError> {
        if self.index.has_partition(&instrument_type.name) {
            return Ok(());
        }
        let names = registry.security_names(instrument_type.id)?;
        let partition = NameIndex::build(&names);
        info!(
            instrument_type = %instrument_type.name,
            names = partition.len(),
            "built name index"
        );
        self.index.insert_partition(&instrument_type.name, partition);
        Ok(())
    }

    /// Makes a newly created security visible to later lookups. A type whose
    /// index is not built yet picks the name up when it is.
    pub fn register(&mut self, instrument_type: &str, name: &str) {
        if self.index.has_partition(instrument_type) {
            self.index.add(instrument_type, name);
        }
    }

    pub fn rename(&mut self, instrument_type: &str, old_name: &str, new_name: &str) {
        if self.index.has_partition(instrument_type) {
            self.index.remove(instrument_type, old_name);
            self.index.add(instrument_type, new_name);
        }
    }

    /// Scored candidates above the threshold, best first. Index hits that no
    /// longer resolve to exactly one security are dropped.
    pub fn candidates(
        &mut self,
        registry: &dyn RegistryPort,
        name: &str,
        instrument_type: &InstrumentType,
    ) -> Result<Vec<Candidate>, SecmasterError> {
        self.ensure_partition(registry, instrument_type)?;
        let hits = self
            .index
            .ranked_search(&instrument_type.name, name, self.threshold);

        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            let mut rows = registry.find_exact(&hit.name, instrument_type.id)?;
            match rows.len() {
                1 => candidates.extend(rows.pop().map(|security| Candidate {
                    security,
                    score: hit.score,
                })),
                0 => debug!(name = %hit.name, "stale index entry"),
                n => error!(
                    name = %hit.name,
                    instrument_type = %instrument_type.name,
                    "{} securities share one search key, candidate unusable",
                    n
                ),
            }
        }
        Ok(candidates)
    }

    pub fn resolve_approximate(
        &mut self,
        registry: &dyn RegistryPort,
        policy: &mut dyn DisambiguationPolicy,
        name: &str,
        instrument_type: &InstrumentType,
    ) -> Result<Resolution, SecmasterError> {
        let candidates = self.candidates(registry, name, instrument_type)?;

        let picked = match decide(name, &candidates, self.separation_margin) {
            Decision::Reject => return Ok(Resolution::NoCandidate),
            Decision::Accept(i) => Some(i),
            Decision::Confirm(i) => policy.confirm(name, &candidates[i]).then_some(i),
            Decision::Choose(indices) => {
                let offered: Vec<Candidate> =
                    indices.iter().map(|&i| candidates[i].clone()).collect();
                policy
                    .choose(name, &offered)
                    .and_then(|choice| indices.get(choice).copied())
            }
        };

        match picked {
            Some(i) => {
                let chosen = candidates[i].clone();
                if candidates.len() > 1 || chosen.score < 1.0 {
                    info!(
                        query = %name,
                        instrument_type = %instrument_type.name,
                        matched = %chosen.security.name,
                        score = chosen.score,
                        candidates = %describe(&candidates),
                        "approximate match accepted"
                    );
                }
                Ok(Resolution::Matched(chosen))
            }
            None if policy.skip_declined() => {
                warn!(
                    query = %name,
                    instrument_type = %instrument_type.name,
                    candidates = %describe(&candidates),
                    "ambiguous match left unresolved"
                );
                Ok(Resolution::Ambiguous(candidates))
            }
            None => {
                warn!(
                    query = %name,
                    instrument_type = %instrument_type.name,
                    candidates = %describe(&candidates),
                    "approximate candidates rejected"
                );
                Ok(Resolution::NoCandidate)
            }
        }
    }
}
