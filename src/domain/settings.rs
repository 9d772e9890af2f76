//! Reconciliation settings and their validation.
//!
//! Read from the `[reconcile]` config section:
//!
//! ```ini
//! [reconcile]
//! threshold = 0.7
//! separation_margin = 0.05
//! default_type = Equity
//! policy = skip
//! accept_margin = 0.1
//! ```

use crate::domain::code_map::CodeMap;
use crate::domain::disambiguation::PolicyKind;
use crate::domain::error::SecmasterError;
use crate::domain::resolver::DEFAULT_THRESHOLD;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_INSTRUMENT_TYPE: &str = "Equity";
pub const DEFAULT_ACCEPT_MARGIN: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileSettings {
    /// Minimum similarity for an approximate candidate or a name change.
    pub threshold: f64,
    /// Lead the top candidate needs over the runner-up to be accepted
    /// without consulting the policy. `None` always consults it.
    pub separation_margin: Option<f64>,
    /// Instrument type for records that carry no type hint.
    pub default_type: String,
    pub policy: PolicyKind,
    /// Margin used by the auto-accept policy.
    pub accept_margin: f64,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            separation_margin: None,
            default_type: DEFAULT_INSTRUMENT_TYPE.to_string(),
            policy: PolicyKind::Skip,
            accept_margin: DEFAULT_ACCEPT_MARGIN,
        }
    }
}

fn invalid(key: &str, reason: &str) -> SecmasterError {
    SecmasterError::ConfigInvalid {
        section: "reconcile".to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Parses an optional float key. A malformed value is an error rather than
/// a fallback to the default.
fn optional_double(config: &dyn ConfigPort, key: &str) -> Result<Option<f64>, SecmasterError> {
    match config.get_string("reconcile", key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| invalid(key, &format!("{key} must be a number"))),
    }
}

impl ReconcileSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SecmasterError> {
        let defaults = Self::default();
        let settings = Self {
            threshold: optional_double(config, "threshold")?.unwrap_or(defaults.threshold),
            separation_margin: optional_double(config, "separation_margin")?,
            default_type: config
                .get_string("reconcile", "default_type")
                .map(|s| s.trim().to_string())
                .unwrap_or(defaults.default_type),
            policy: match config.get_string("reconcile", "policy") {
                Some(s) => s.parse()?,
                None => defaults.policy,
            },
            accept_margin: optional_double(config, "accept_margin")?
                .unwrap_or(defaults.accept_margin),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Replaces `default_type` with the canonical type it maps to. An
    /// unknown default would otherwise open a type of its own.
    pub fn resolve_default_type(&mut self, code_map: &CodeMap) -> Result<(), SecmasterError> {
        let canonical = code_map
            .canonical_type(&self.default_type)
            .ok_or_else(|| {
                invalid(
                    "default_type",
                    &format!("unknown instrument type {:?}", self.default_type),
                )
            })?;
        self.default_type = canonical.to_string();
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SecmasterError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(invalid("threshold", "threshold must be in (0, 1]"));
        }
        if let Some(margin) = self.separation_margin {
            if !(0.0..1.0).contains(&margin) {
                return Err(invalid(
                    "separation_margin",
                    "separation_margin must be in [0, 1)",
                ));
            }
        }
        if !(0.0..1.0).contains(&self.accept_margin) {
            return Err(invalid("accept_margin", "accept_margin must be in [0, 1)"));
        }
        if self.default_type.is_empty() {
            return Err(invalid("default_type", "default_type must not be empty"));
        }
        Ok(())
    }
}
