//! Control-plane and step state values

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Explicit, persisted state of a migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlState {
    /// Plan written, not yet approved
    Draft,
    /// Plan approved by a human
    PlanApproved,
    /// Waiting for an execution slot
    Queued,
    /// A step is being worked on
    Running,
    /// Waiting for review of the produced PR
    AwaitingReview,
    /// Halted by a human or the orchestrator
    Paused,
    /// Execution failed; only cancellation remains
    Failed,
    /// All work merged (terminal)
    Done,
    /// Abandoned (terminal)
    Cancelled,
    /// Deliberately not executed (terminal)
    Skipped,
}

impl ControlState {
    /// All states, in declaration order
    pub const ALL: [ControlState; 10] = [
        Self::Draft,
        Self::PlanApproved,
        Self::Queued,
        Self::Running,
        Self::AwaitingReview,
        Self::Paused,
        Self::Failed,
        Self::Done,
        Self::Cancelled,
        Self::Skipped,
    ];

    /// Terminal states accept no further transitions
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Skipped)
    }

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PlanApproved => "plan-approved",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::AwaitingReview => "awaiting-review",
            Self::Paused => "paused",
            Self::Failed => "failed",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress state of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    /// Not started
    Pending,
    /// Agent working on it
    Running,
    /// Finished successfully (terminal)
    Completed,
    /// Attempt failed; may be retried
    Failed,
    /// Deliberately not executed (terminal)
    Skipped,
}

impl StepState {
    /// All states, in declaration order
    pub const ALL: [StepState; 5] = [
        Self::Pending,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Skipped,
    ];

    /// Completed and skipped steps never change again
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pull request produced by a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    /// Pull-request number
    pub number: u64,
    /// Web URL
    #[serde(default)]
    pub url: String,
}

impl PullRequestRef {
    /// Reference without URL
    #[inline]
    #[must_use]
    pub fn new(number: u64) -> Self {
        Self {
            number,
            url: String::new(),
        }
    }
}

/// Per-step progress record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    /// Step id
    pub step_id: String,
    /// Current state
    pub state: StepState,
    /// Number of retries (failed → running)
    #[serde(default)]
    pub retry_count: u32,
    /// Last time the step entered `running`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Last time the step left `running`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// PR produced for this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestRef>,
    /// Agent assigned to this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl StepProgress {
    /// Pending step
    #[inline]
    #[must_use]
    pub fn pending(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            state: StepState::Pending,
            retry_count: 0,
            started_at: None,
            completed_at: None,
            pull_request: None,
            agent: None,
        }
    }
}

/// Optional data recorded together with a step transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepUpdate {
    /// PR produced by the step
    pub pull_request: Option<PullRequestRef>,
    /// Agent working on the step
    pub agent: Option<String>,
}

impl StepUpdate {
    /// Empty update
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With pull request
    #[inline]
    #[must_use]
    pub fn with_pull_request(mut self, pr: PullRequestRef) -> Self {
        self.pull_request = Some(pr);
        self
    }

    /// With agent
    #[inline]
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }
}

/// What a transition record refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum TransitionSubject {
    /// The migration's control state
    Migration,
    /// A step
    Step(String),
}

/// Audit entry for an accepted transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Migration or step
    pub subject: TransitionSubject,
    /// State before
    pub from: String,
    /// State after
    pub to: String,
    /// When it happened
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_state_wire_names() {
        let json = serde_json::to_string(&ControlState::PlanApproved).unwrap();
        assert_eq!(json, "\"plan-approved\"");
        let back: ControlState = serde_json::from_str("\"awaiting-review\"").unwrap();
        assert_eq!(back, ControlState::AwaitingReview);
        for state in ControlState::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }

    #[test]
    fn terminal_states() {
        assert!(ControlState::Done.is_terminal());
        assert!(ControlState::Skipped.is_terminal());
        assert!(!ControlState::Failed.is_terminal());
        assert!(StepState::Completed.is_terminal());
        assert!(!StepState::Failed.is_terminal());
    }

    #[test]
    fn step_update_builder() {
        let update = StepUpdate::new()
            .with_pull_request(PullRequestRef::new(12))
            .with_agent("mock-agent");
        assert_eq!(update.pull_request.unwrap().number, 12);
        assert_eq!(update.agent.as_deref(), Some("mock-agent"));
    }
}
