//! Built-in disambiguation strategies.

use crate::domain::error::SecmasterError;
use crate::domain::resolver::Candidate;
use crate::ports::disambiguation_port::DisambiguationPolicy;
use std::fmt;
use std::str::FromStr;

/// Policy names accepted in configuration and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Skip,
    AutoAccept,
    AutoReject,
    Interactive,
}

impl FromStr for PolicyKind {
    type Err = SecmasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(PolicyKind::Skip),
            "auto-accept" | "auto_accept" => Ok(PolicyKind::AutoAccept),
            "auto-reject" | "auto_reject" => Ok(PolicyKind::AutoReject),
            "interactive" => Ok(PolicyKind::Interactive),
            other => Err(SecmasterError::ConfigInvalid {
                section: "reconcile".into(),
                key: "policy".into(),
                reason: format!(
                    "unknown policy {other:?} (expected skip, auto-accept, auto-reject or interactive)"
                ),
            }),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyKind::Skip => "skip",
            PolicyKind::AutoAccept => "auto-accept",
            PolicyKind::AutoReject => "auto-reject",
            PolicyKind::Interactive => "interactive",
        };
        f.write_str(name)
    }
}

/// Disambiguation strategy handed to the reconciler.
pub enum Policy {
    /// Never decide; the record is skipped as ambiguous.
    Skip,
    /// Confirm single candidates; among several, take the best when it leads
    /// the runner-up by at least `margin`, otherwise skip.
    AutoAcceptBest { margin: f64 },
    /// Decline every candidate; a new instrument is created.
    AutoReject,
    /// Delegate to a human-facing handler.
    Interactive(Box<dyn DisambiguationPolicy>),
}

impl DisambiguationPolicy for Policy {
    fn confirm(&mut self, query: &str, candidate: &Candidate) -> bool {
        match self {
            Policy::Skip | Policy::AutoReject => false,
            Policy::AutoAcceptBest { .. } => true,
            Policy::Interactive(handler) => handler.confirm(query, candidate),
        }
    }

    fn choose(&mut self, query: &str, candidates: &[Candidate]) -> Option<usize> {
        match self {
            Policy::Skip | Policy::AutoReject => None,
            Policy::AutoAcceptBest { margin } => match candidates {
                [] => None,
                [_] => Some(0),
                [top, second, ..] => (top.score - second.score >= *margin).then_some(0),
            },
            Policy::Interactive(handler) => handler.choose(query, candidates),
        }
    }

    fn skip_declined(&self) -> bool {
        match self {
            Policy::Skip | Policy::AutoAcceptBest { .. } => true,
            Policy::AutoReject => false,
            Policy::Interactive(handler) => handler.skip_declined(),
        }
    }
}
