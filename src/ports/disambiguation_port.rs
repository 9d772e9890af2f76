//! Disambiguation policy port.

use crate::domain::resolver::Candidate;

/// Decides matches the candidate resolver cannot settle on its own.
///
/// Candidates are passed best first.
pub trait DisambiguationPolicy {
    /// Whether the single approximate `candidate` is the instrument named
    /// by `query`.
    fn confirm(&mut self, query: &str, candidate: &Candidate) -> bool;

    /// Index into `candidates` of the instrument named by `query`, or `None`
    /// to decline.
    fn choose(&mut self, query: &str, candidates: &[Candidate]) -> Option<usize>;

    /// Whether the most recent decline means "skip this record" rather than
    /// "no match, create a new instrument".
    fn skip_declined(&self) -> bool {
        false
    }
}
