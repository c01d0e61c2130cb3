//! Agent-dispatch collaborator interface
//!
//! Providers implement [`AgentDispatcher`]; the orchestrator submits work
//! and polls until a terminal status, bounded by the step timeout. Only an
//! [`AuthorizedContext`] can be submitted.

use async_trait::async_trait;
use hachiko_policy::AuthorizedContext;
use serde::{Deserialize, Serialize};

/// Outcome reported by an agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResult {
    /// Agent finished its task
    pub success: bool,
    /// Files changed
    #[serde(default)]
    pub modified_files: Vec<String>,
    /// Files added
    #[serde(default)]
    pub created_files: Vec<String>,
    /// Files removed
    #[serde(default)]
    pub deleted_files: Vec<String>,
    /// Agent transcript or summary
    #[serde(default)]
    pub output: String,
    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResult {
    /// Successful result
    #[must_use]
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            ..Self::default()
        }
    }

    /// Failed result
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// With modified files
    #[must_use]
    pub fn with_modified_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modified_files = files.into_iter().map(Into::into).collect();
        self
    }
}

/// Status of a submitted agent session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    /// Accepted, not started
    Queued,
    /// In progress
    Running,
    /// Terminal
    Finished(AgentResult),
}

/// Dispatch failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    /// Provider unreachable or returned garbage
    #[error("agent transport error: {0}")]
    Transport(String),

    /// Provider refused the session
    #[error("agent rejected the request: {0}")]
    Rejected(String),

    /// Session id unknown to the provider
    #[error("unknown agent session: {0}")]
    UnknownSession(String),
}

impl DispatchError {
    /// Machine-readable error code
    #[inline]
    #[must_use]
    pub fn code(&self) -> &'static str {
        "COLLABORATOR_IO_ERROR"
    }

    /// Transport failures are transient
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Structured details payload
    #[must_use]
    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::Transport(cause) => serde_json::json!({ "kind": "transport", "cause": cause }),
            Self::Rejected(cause) => serde_json::json!({ "kind": "rejected", "cause": cause }),
            Self::UnknownSession(session) => {
                serde_json::json!({ "kind": "unknown_session", "sessionId": session })
            }
        }
    }
}

/// Coding-agent provider
#[async_trait]
pub trait AgentDispatcher: Send + Sync {
    /// Start a session; returns the provider's session id
    async fn submit(&self, context: &AuthorizedContext, prompt: &str)
        -> Result<String, DispatchError>;

    /// Current status of a session
    async fn poll(&self, session_id: &str) -> Result<AgentStatus, DispatchError>;
}
