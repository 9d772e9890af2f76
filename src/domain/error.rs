//! Domain error types.

/// Top-level error type for secmaster.
#[derive(Debug, thiserror::Error)]
pub enum SecmasterError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("record parse error at line {line}: {reason}")]
    RecordParse { line: u64, reason: String },

    #[error("invalid record for {symbol}: {reason}")]
    Validation { symbol: String, reason: String },

    #[error("no mapping for {kind} {code}")]
    NotFound { kind: String, code: String },

    #[error("ambiguous match for {query}: {reason}")]
    Ambiguity { query: String, reason: String },

    #[error("integrity violation for {subject}: {reason}")]
    IntegrityViolation { subject: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&SecmasterError> for std::process::ExitCode {
    fn from(err: &SecmasterError) -> Self {
        let code: u8 = match err {
            SecmasterError::Io(_) => 1,
            SecmasterError::ConfigParse { .. }
            | SecmasterError::ConfigMissing { .. }
            | SecmasterError::ConfigInvalid { .. } => 2,
            SecmasterError::Database { .. } | SecmasterError::DatabaseQuery { .. } => 3,
            SecmasterError::RecordParse { .. } | SecmasterError::Validation { .. } => 4,
            SecmasterError::NotFound { .. }
            | SecmasterError::Ambiguity { .. }
            | SecmasterError::IntegrityViolation { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
