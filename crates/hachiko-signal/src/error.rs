//! Error types for signal extraction

/// Errors raised while producing or parsing naming conventions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    /// Migration id contains characters outside `[A-Za-z0-9._-]` or is empty
    #[error("invalid migration id: '{0}'")]
    InvalidMigrationId(String),

    /// Step fragment is neither a positive integer nor `cleanup`
    #[error("invalid step: '{0}'")]
    InvalidStep(String),
}

impl SignalError {
    /// Machine-readable error code
    #[inline]
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidMigrationId(_) => "INVALID_MIGRATION_ID",
            Self::InvalidStep(_) => "INVALID_STEP",
        }
    }

    /// Structured details payload
    #[must_use]
    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::InvalidMigrationId(id) => serde_json::json!({ "migrationId": id }),
            Self::InvalidStep(step) => serde_json::json!({ "step": step }),
        }
    }
}
