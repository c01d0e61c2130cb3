//! Transition tables
//!
//! ```text
//! draft → plan-approved → queued → running
//! running → awaiting-review | failed | paused
//! awaiting-review → running | done
//! paused → queued | running
//! any non-terminal → cancelled
//!
//! step: pending → running → completed | failed | skipped
//!       failed → running (retry)
//! ```

use crate::types::{ControlState, StepState};

/// Legal successors of a control state
#[must_use]
pub fn allowed_control_transitions(from: ControlState) -> Vec<ControlState> {
    let mut next = match from {
        ControlState::Draft => vec![ControlState::PlanApproved],
        ControlState::PlanApproved => vec![ControlState::Queued],
        ControlState::Queued => vec![ControlState::Running],
        ControlState::Running => vec![
            ControlState::AwaitingReview,
            ControlState::Failed,
            ControlState::Paused,
        ],
        ControlState::AwaitingReview => vec![ControlState::Running, ControlState::Done],
        ControlState::Paused => vec![ControlState::Queued, ControlState::Running],
        ControlState::Failed => vec![],
        ControlState::Done | ControlState::Cancelled | ControlState::Skipped => return vec![],
    };
    next.push(ControlState::Cancelled);
    next
}

/// Check a control-state edge
#[inline]
#[must_use]
pub fn is_control_transition_allowed(from: ControlState, to: ControlState) -> bool {
    allowed_control_transitions(from).contains(&to)
}

/// Legal successors of a step state
#[must_use]
pub fn allowed_step_transitions(from: StepState) -> Vec<StepState> {
    match from {
        StepState::Pending => vec![StepState::Running],
        StepState::Running => vec![StepState::Completed, StepState::Failed, StepState::Skipped],
        StepState::Failed => vec![StepState::Running],
        StepState::Completed | StepState::Skipped => vec![],
    }
}

/// Check a step-state edge
#[inline]
#[must_use]
pub fn is_step_transition_allowed(from: StepState, to: StepState) -> bool {
    allowed_step_transitions(from).contains(&to)
}
