//! Pure state inference
//!
//! Derivation order (first match wins):
//! 1. every checklist task done → `completed`, even with open PRs
//! 2. any open PR → `active`
//! 3. any closed PR → `paused`
//! 4. otherwise → `pending`

use chrono::{DateTime, Utc};
use hachiko_signal::HachikoPr;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::document::ChecklistSummary;

/// Lifecycle state inferred from signals; never the source of truth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferredMigrationState {
    /// No evidence yet
    Pending,
    /// At least one open PR
    Active,
    /// Only closed PRs
    Paused,
    /// Checklist fully checked
    Completed,
}

impl fmt::Display for InferredMigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Reconciled view of one migration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStateInfo {
    /// Migration id
    pub migration_id: String,
    /// Inferred state
    pub state: InferredMigrationState,
    /// Open PRs, ascending by number
    pub open_prs: Vec<HachikoPr>,
    /// Closed PRs (merged or not), ascending by number
    pub closed_prs: Vec<HachikoPr>,
    /// Step that should execute next (1-based)
    pub current_step: u32,
    /// Checklist task count
    pub total_tasks: u32,
    /// Checked checklist tasks
    pub completed_tasks: u32,
    /// Every checklist task checked
    pub all_tasks_complete: bool,
    /// When this view was computed
    pub last_updated: DateTime<Utc>,
}

/// Derive the lifecycle state
#[must_use]
pub fn derive_state(
    has_open: bool,
    has_closed: bool,
    checklist: Option<&ChecklistSummary>,
) -> InferredMigrationState {
    if checklist.is_some_and(|c| c.all_tasks_complete) {
        InferredMigrationState::Completed
    } else if has_open {
        InferredMigrationState::Active
    } else if has_closed {
        InferredMigrationState::Paused
    } else {
        InferredMigrationState::Pending
    }
}

/// Step that should execute next
///
/// - open PRs: lowest numbered step among them (1 if none carry a number)
/// - merged PRs: highest merged step + 1; counting merges would undercount
///   when a later step was merged after an earlier one failed
/// - closed unmerged PRs: step of the most recent (highest-numbered) attempt
/// - nothing: 1
#[must_use]
pub fn compute_current_step(open: &[HachikoPr], closed: &[HachikoPr]) -> u32 {
    if !open.is_empty() {
        return open.iter().filter_map(|pr| pr.step.number()).min().unwrap_or(1);
    }

    let highest_merged = closed
        .iter()
        .filter(|pr| pr.is_merged())
        .filter_map(|pr| pr.step.number())
        .max();
    if let Some(step) = highest_merged {
        return step.saturating_add(1);
    }

    closed
        .iter()
        .filter(|pr| !pr.is_merged())
        .filter_map(|pr| pr.step.number().map(|step| (pr.number, step)))
        .max_by_key(|(number, _)| *number)
        .map_or(1, |(_, step)| step)
}

/// Build the reconciled view from already-attributed PRs
#[must_use]
pub fn infer_state(
    migration_id: &str,
    mut open: Vec<HachikoPr>,
    mut closed: Vec<HachikoPr>,
    checklist: Option<&ChecklistSummary>,
    now: DateTime<Utc>,
) -> MigrationStateInfo {
    open.sort_by_key(|pr| pr.number);
    closed.sort_by_key(|pr| pr.number);

    let state = derive_state(!open.is_empty(), !closed.is_empty(), checklist);
    let current_step = compute_current_step(&open, &closed);
    let summary = checklist.copied().unwrap_or_default();

    tracing::debug!(
        "Inferred {} for {}: step {} ({} open, {} closed)",
        state,
        migration_id,
        current_step,
        open.len(),
        closed.len()
    );

    MigrationStateInfo {
        migration_id: migration_id.to_string(),
        state,
        open_prs: open,
        closed_prs: closed,
        current_step,
        total_tasks: summary.total_tasks,
        completed_tasks: summary.completed_tasks,
        all_tasks_complete: summary.all_tasks_complete,
        last_updated: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hachiko_signal::{PrState, StepRef};

    fn pr(number: u64, step: u32, state: PrState) -> HachikoPr {
        HachikoPr {
            number,
            title: format!("step {step}"),
            url: String::new(),
            branch: format!("hachiko/m-step-{step}"),
            labels: Vec::new(),
            migration_id: "m".to_string(),
            step: StepRef::Number(step),
            state,
        }
    }

    #[test]
    fn merged_out_of_order_uses_highest_merged() {
        let closed = vec![
            pr(123, 1, PrState::Merged),
            pr(124, 2, PrState::Closed),
            pr(125, 3, PrState::Merged),
        ];
        assert_eq!(compute_current_step(&[], &closed), 4);
    }

    #[test]
    fn failed_after_merge_retries_next() {
        let closed = vec![pr(123, 1, PrState::Merged), pr(124, 2, PrState::Closed)];
        let info = infer_state("m", Vec::new(), closed, None, Utc::now());
        assert_eq!(info.state, InferredMigrationState::Paused);
        assert_eq!(info.current_step, 2);
    }

    #[test]
    fn open_prs_use_lowest_step() {
        let open = vec![pr(124, 2, PrState::Open), pr(123, 1, PrState::Open)];
        let info = infer_state("m", open, Vec::new(), None, Utc::now());
        assert_eq!(info.state, InferredMigrationState::Active);
        assert_eq!(info.current_step, 1);
        assert_eq!(info.open_prs[0].number, 123);
    }

    #[test]
    fn only_failed_attempts_retry_most_recent() {
        let closed = vec![pr(10, 3, PrState::Closed), pr(12, 2, PrState::Closed)];
        assert_eq!(compute_current_step(&[], &closed), 2);
    }

    #[test]
    fn open_without_numbers_defaults_to_one() {
        let mut unnumbered = pr(5, 1, PrState::Open);
        unnumbered.step = StepRef::Unspecified;
        assert_eq!(compute_current_step(&[unnumbered], &[]), 1);
    }

    #[test]
    fn complete_checklist_overrides_open_prs() {
        let checklist = ChecklistSummary::new(2, 2);
        let info = infer_state(
            "m",
            vec![pr(1, 1, PrState::Open)],
            Vec::new(),
            Some(&checklist),
            Utc::now(),
        );
        assert_eq!(info.state, InferredMigrationState::Completed);
        assert!(info.all_tasks_complete);
    }

    #[test]
    fn no_evidence_is_pending() {
        assert_eq!(derive_state(false, false, None), InferredMigrationState::Pending);
        assert_eq!(compute_current_step(&[], &[]), 1);
    }
}
