//! Top-level error type
//!
//! Aggregates the per-component errors and classifies them:
//! - Configuration and policy violations are fatal and never retried
//! - State errors are fatal for the call; re-derive state before retrying
//! - Collaborator I/O is transient

use hachiko_policy::PolicyError;
use hachiko_reconcile::ReconcileError;
use hachiko_signal::{RemediationHint, SignalError};
use hachiko_state::MigrationStateError;

use crate::config::ConfigError;
use crate::dispatch::DispatchError;

/// Main Hachiko error type
#[derive(Debug, thiserror::Error)]
pub enum HachikoError {
    /// Naming convention error
    #[error("signal error: {0}")]
    Signal(#[from] SignalError),

    /// PR listing failed
    #[error("reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Invalid transition, unknown migration or step, store failure
    #[error("{0}")]
    State(#[from] MigrationStateError),

    /// Policy configuration, violation or approval
    #[error("{0}")]
    Policy(#[from] PolicyError),

    /// Bad configuration
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Agent provider failure
    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    /// PR claims to be a migration PR but cannot be attributed
    #[error("pull request #{number} does not follow migration conventions")]
    UnrecognizedPullRequest {
        /// PR number
        number: u64,
        /// Missing conventions
        hints: Vec<RemediationHint>,
    },

    /// Step used up its attempts
    #[error("step {step_id} of {migration_id} exhausted {attempts} attempt(s)")]
    AttemptsExhausted {
        /// Migration
        migration_id: String,
        /// Step
        step_id: String,
        /// Attempts made
        attempts: u32,
    },

    /// Too many migrations running
    #[error("{running} migration(s) running, limit is {limit}")]
    ConcurrencyLimit {
        /// Currently running
        running: usize,
        /// Configured limit
        limit: usize,
    },
}

impl HachikoError {
    /// Machine-readable error code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Signal(e) => e.code(),
            Self::Reconcile(e) => e.code(),
            Self::State(e) => e.code(),
            Self::Policy(e) => e.code(),
            Self::Config(e) => e.code(),
            Self::Dispatch(e) => e.code(),
            Self::UnrecognizedPullRequest { .. } => "UNRECOGNIZED_PULL_REQUEST",
            Self::AttemptsExhausted { .. } => "ATTEMPTS_EXHAUSTED",
            Self::ConcurrencyLimit { .. } => "CONCURRENCY_LIMIT",
        }
    }

    /// Worth retrying unchanged later
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Reconcile(e) => e.is_retryable(),
            Self::State(e) => e.is_retryable(),
            Self::Dispatch(e) => e.is_retryable(),
            Self::ConcurrencyLimit { .. } => true,
            Self::Signal(_)
            | Self::Policy(_)
            | Self::Config(_)
            | Self::UnrecognizedPullRequest { .. }
            | Self::AttemptsExhausted { .. } => false,
        }
    }

    /// Needs a human before anything else happens
    #[must_use]
    pub fn requires_human(&self) -> bool {
        match self {
            Self::Policy(e) => e.requires_human(),
            Self::AttemptsExhausted { .. } | Self::UnrecognizedPullRequest { .. } => true,
            _ => false,
        }
    }

    /// User-facing remediation hints, when any can be computed
    #[must_use]
    pub fn remediation(&self) -> Vec<String> {
        match self {
            Self::UnrecognizedPullRequest { hints, .. } => {
                hints.iter().map(|h| h.message().to_string()).collect()
            }
            Self::Policy(PolicyError::Violation { violations }) => violations
                .iter()
                .map(|v| format!("{}: {}", v.rule_id, v.message))
                .collect(),
            Self::Policy(PolicyError::ApprovalRequired { rules }) => rules
                .iter()
                .map(|r| format!("Obtain approval required by rule {r}"))
                .collect(),
            Self::AttemptsExhausted { step_id, .. } => vec![format!(
                "Investigate the failures of {step_id}, then skip it or raise max_attempts_per_step"
            )],
            _ => Vec::new(),
        }
    }

    /// Structured details payload
    #[must_use]
    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::Signal(e) => e.details(),
            Self::Reconcile(e) => e.details(),
            Self::State(e) => e.details(),
            Self::Policy(e) => e.details(),
            Self::Config(e) => e.details(),
            Self::Dispatch(e) => e.details(),
            Self::UnrecognizedPullRequest { number, hints } => serde_json::json!({
                "number": number,
                "hints": hints,
            }),
            Self::AttemptsExhausted {
                migration_id,
                step_id,
                attempts,
            } => serde_json::json!({
                "migrationId": migration_id,
                "stepId": step_id,
                "attempts": attempts,
            }),
            Self::ConcurrencyLimit { running, limit } => serde_json::json!({
                "running": running,
                "limit": limit,
            }),
        }
    }
}

/// Result type alias
pub type HachikoResult<T> = Result<T, HachikoError>;
