//! Error types for reconciliation

use crate::source::SourceError;

/// Reconciliation failures
///
/// Only PR-list failures surface here; a failed document fetch degrades to
/// PR-only inference instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReconcileError {
    /// Listing pull requests failed; no state is derivable without them
    #[error("failed to {operation} for {repo}: {source}")]
    PullRequestListing {
        /// Which listing failed
        operation: &'static str,
        /// Repository
        repo: String,
        /// Underlying collaborator error
        #[source]
        source: SourceError,
    },
}

impl ReconcileError {
    /// Machine-readable error code
    #[inline]
    #[must_use]
    pub fn code(&self) -> &'static str {
        "COLLABORATOR_IO_ERROR"
    }

    /// Collaborator I/O is transient
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PullRequestListing { source, .. } => {
                !matches!(source, SourceError::Unauthorized(_))
            }
        }
    }

    /// Structured details payload
    #[must_use]
    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::PullRequestListing {
                operation,
                repo,
                source,
            } => serde_json::json!({
                "operation": operation,
                "repository": repo,
                "cause": source.to_string(),
            }),
        }
    }
}

/// Result type alias for reconciliation
pub type ReconcileResult<T> = Result<T, ReconcileError>;
