//! External evidence sources
//!
//! Implemented by collaborators (code-host clients, document fetchers).
//! Pagination and rate limiting are their concern.

use async_trait::async_trait;
use hachiko_signal::PrSignal;

/// Errors reported by a collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Network or transport failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// Upstream rate limit hit
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the limit resets
        retry_after_secs: u64,
    },

    /// Credentials rejected
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Upstream returned data that could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Source of pull-request listings for a repository
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    /// Open pull requests
    async fn list_open(&self, repo: &str) -> Result<Vec<PrSignal>, SourceError>;

    /// Closed pull requests, merged or not
    async fn list_closed(&self, repo: &str) -> Result<Vec<PrSignal>, SourceError>;
}

/// Source of migration documents
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Document text, `Ok(None)` when no document exists
    async fn get_document(&self, migration_id: &str) -> Result<Option<String>, SourceError>;
}
