//! Error types for the migration state machine
//!
//! Provides error handling for:
//! - Illegal control and step transitions
//! - Unknown migrations and steps
//! - Persistence failures and version conflicts

use crate::types::{ControlState, StepState};

/// State machine failures
///
/// Fatal for the call that produced them; the stored snapshot is left
/// unchanged and callers re-derive state before retrying.
#[derive(Debug, thiserror::Error)]
pub enum MigrationStateError {
    /// Control transition not in the table
    #[error("invalid transition for {migration_id}: {from} -> {to}")]
    InvalidTransition {
        /// Migration
        migration_id: String,
        /// Current state
        from: ControlState,
        /// Requested state
        to: ControlState,
    },

    /// Step transition not in the table
    #[error("invalid step transition for {migration_id}/{step_id}: {from} -> {to}")]
    InvalidStepTransition {
        /// Migration
        migration_id: String,
        /// Step
        step_id: String,
        /// Current state
        from: StepState,
        /// Requested state
        to: StepState,
    },

    /// No snapshot stored under this id
    #[error("migration not found: {0}")]
    MigrationNotFound(String),

    /// Step id unknown to the migration
    #[error("step not found: {migration_id}/{step_id}")]
    StepNotFound {
        /// Migration
        migration_id: String,
        /// Step
        step_id: String,
    },

    /// A snapshot already exists under this id
    #[error("migration already exists: {0}")]
    AlreadyExists(String),

    /// Step ids must be unique within a plan
    #[error("duplicate step id in {migration_id}: {step_id}")]
    DuplicateStep {
        /// Migration
        migration_id: String,
        /// Step
        step_id: String,
    },

    /// Another step of the migration is running
    #[error("cannot start {step_id} in {migration_id}: step {running} is running")]
    StepAlreadyRunning {
        /// Migration
        migration_id: String,
        /// Requested step
        step_id: String,
        /// Step currently running
        running: String,
    },

    /// Migration reached a terminal state and is read-only
    #[error("migration {migration_id} is {state} and read-only")]
    Terminal {
        /// Migration
        migration_id: String,
        /// Terminal state
        state: ControlState,
    },

    /// Store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl MigrationStateError {
    /// Machine-readable error code
    #[inline]
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Store(e) => e.code(),
            _ => "MIGRATION_STATE_ERROR",
        }
    }

    /// Only store-level failures are worth retrying as-is
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_retryable())
    }

    /// Structured details payload
    #[must_use]
    pub fn details(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Self::InvalidTransition {
                migration_id,
                from,
                to,
            } => json!({
                "kind": "invalid_transition",
                "migrationId": migration_id,
                "from": from.as_str(),
                "to": to.as_str(),
            }),
            Self::InvalidStepTransition {
                migration_id,
                step_id,
                from,
                to,
            } => json!({
                "kind": "invalid_step_transition",
                "migrationId": migration_id,
                "stepId": step_id,
                "from": from.as_str(),
                "to": to.as_str(),
            }),
            Self::MigrationNotFound(id) => json!({
                "kind": "migration_not_found",
                "migrationId": id,
            }),
            Self::AlreadyExists(id) => json!({
                "kind": "already_exists",
                "migrationId": id,
            }),
            Self::StepNotFound {
                migration_id,
                step_id,
            } => json!({
                "kind": "step_not_found",
                "migrationId": migration_id,
                "stepId": step_id,
            }),
            Self::DuplicateStep {
                migration_id,
                step_id,
            } => json!({
                "kind": "duplicate_step",
                "migrationId": migration_id,
                "stepId": step_id,
            }),
            Self::StepAlreadyRunning {
                migration_id,
                step_id,
                running,
            } => json!({
                "kind": "step_already_running",
                "migrationId": migration_id,
                "stepId": step_id,
                "runningStep": running,
            }),
            Self::Terminal {
                migration_id,
                state,
            } => json!({
                "kind": "terminal",
                "migrationId": migration_id,
                "state": state.as_str(),
            }),
            Self::Store(e) => e.details(),
        }
    }
}

/// Persistence failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot changed since it was loaded
    #[error("version conflict for {id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Migration
        id: String,
        /// Version the writer loaded
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// Id not usable as a storage key
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
}

impl StoreError {
    /// Machine-readable error code
    #[inline]
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            _ => "COLLABORATOR_IO_ERROR",
        }
    }

    /// I/O and conflicts are transient
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::VersionConflict { .. })
    }

    /// Structured details payload
    #[must_use]
    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::VersionConflict {
                id,
                expected,
                actual,
            } => serde_json::json!({
                "kind": "version_conflict",
                "migrationId": id,
                "expected": expected,
                "actual": actual,
            }),
            Self::InvalidKey(key) => serde_json::json!({ "kind": "invalid_key", "key": key }),
            other => serde_json::json!({ "kind": "store", "cause": other.to_string() }),
        }
    }
}

/// Result type alias for state operations
pub type StateResult<T> = Result<T, MigrationStateError>;
