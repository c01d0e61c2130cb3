//! Canonical persisted migration aggregate

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{MigrationStateError, StateResult};
use crate::transitions::{is_control_transition_allowed, is_step_transition_allowed};
use crate::types::{
    ControlState, StepProgress, StepState, StepUpdate, TransitionRecord, TransitionSubject,
};

/// Persisted progress of one migration
///
/// Counters are always recomputed from `steps`; they are never adjusted
/// independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgress {
    /// Migration id
    pub plan_id: String,
    /// Control-plane state
    pub state: ControlState,
    /// Tracking issue, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<u64>,
    /// Number of steps in the plan
    pub total_steps: usize,
    /// Steps in `completed`
    pub completed_steps: usize,
    /// Steps in `failed`
    pub failed_steps: usize,
    /// Steps in `skipped`
    pub skipped_steps: usize,
    /// Id of the running step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    /// Per-step progress, in plan order
    pub steps: IndexMap<String, StepProgress>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Time of the last mutation
    pub last_updated_at: DateTime<Utc>,
    /// First time the migration entered `running`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Time the migration reached a terminal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency version, bumped on every save
    #[serde(default)]
    pub version: u64,
    /// Accepted transitions, oldest first
    #[serde(default)]
    pub history: Vec<TransitionRecord>,
}

impl MigrationProgress {
    /// Create a `draft` snapshot with every step pending
    ///
    /// # Errors
    /// `DuplicateStep` if a step id appears twice.
    pub fn new<I, S>(
        plan_id: impl Into<String>,
        issue_number: Option<u64>,
        step_ids: I,
        now: DateTime<Utc>,
    ) -> StateResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let plan_id = plan_id.into();
        let mut steps = IndexMap::new();
        for step_id in step_ids {
            let step_id = step_id.into();
            if steps.contains_key(&step_id) {
                return Err(MigrationStateError::DuplicateStep {
                    migration_id: plan_id,
                    step_id,
                });
            }
            steps.insert(step_id.clone(), StepProgress::pending(step_id));
        }

        let mut progress = Self {
            plan_id,
            state: ControlState::Draft,
            issue_number,
            total_steps: 0,
            completed_steps: 0,
            failed_steps: 0,
            skipped_steps: 0,
            current_step: None,
            steps,
            metadata: BTreeMap::new(),
            last_updated_at: now,
            started_at: None,
            completed_at: None,
            version: 0,
            history: Vec::new(),
        };
        progress.recompute();
        Ok(progress)
    }

    /// With metadata entry
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Apply a control-state transition
    ///
    /// # Errors
    /// `InvalidTransition` if the edge is not in the table; the snapshot is
    /// left untouched.
    pub fn transition(&mut self, to: ControlState, now: DateTime<Utc>) -> StateResult<()> {
        let from = self.state;
        if !is_control_transition_allowed(from, to) {
            return Err(MigrationStateError::InvalidTransition {
                migration_id: self.plan_id.clone(),
                from,
                to,
            });
        }

        self.state = to;
        if to == ControlState::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.completed_at = Some(now);
        }
        self.history.push(TransitionRecord {
            subject: TransitionSubject::Migration,
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
            at: now,
        });
        self.last_updated_at = now;
        Ok(())
    }

    /// Apply a step transition together with its update
    ///
    /// # Errors
    /// - `Terminal` if the migration is done, cancelled or skipped
    /// - `StepNotFound` for an unknown step id
    /// - `InvalidStepTransition` if the edge is not in the table
    /// - `StepAlreadyRunning` when starting a step while another runs
    ///
    /// On error the snapshot is left untouched.
    pub fn transition_step(
        &mut self,
        step_id: &str,
        to: StepState,
        update: StepUpdate,
        now: DateTime<Utc>,
    ) -> StateResult<()> {
        if self.state.is_terminal() {
            return Err(MigrationStateError::Terminal {
                migration_id: self.plan_id.clone(),
                state: self.state,
            });
        }

        let running = self.running_step().map(|s| s.step_id.clone());
        let step = self
            .steps
            .get_mut(step_id)
            .ok_or_else(|| MigrationStateError::StepNotFound {
                migration_id: self.plan_id.clone(),
                step_id: step_id.to_string(),
            })?;

        let from = step.state;
        if !is_step_transition_allowed(from, to) {
            return Err(MigrationStateError::InvalidStepTransition {
                migration_id: self.plan_id.clone(),
                step_id: step_id.to_string(),
                from,
                to,
            });
        }
        if to == StepState::Running {
            if let Some(running) = running.filter(|r| r != step_id) {
                return Err(MigrationStateError::StepAlreadyRunning {
                    migration_id: self.plan_id.clone(),
                    step_id: step_id.to_string(),
                    running,
                });
            }
        }

        if from == StepState::Failed && to == StepState::Running {
            step.retry_count += 1;
        }
        step.state = to;
        match to {
            StepState::Running => {
                step.started_at = Some(now);
                step.completed_at = None;
            }
            StepState::Completed | StepState::Failed | StepState::Skipped => {
                step.completed_at = Some(now);
            }
            StepState::Pending => {}
        }
        if let Some(pr) = update.pull_request {
            step.pull_request = Some(pr);
        }
        if let Some(agent) = update.agent {
            step.agent = Some(agent);
        }

        self.history.push(TransitionRecord {
            subject: TransitionSubject::Step(step_id.to_string()),
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
            at: now,
        });
        self.recompute();
        self.last_updated_at = now;
        Ok(())
    }

    /// Recompute counters and `current_step` by scanning every step
    pub fn recompute(&mut self) {
        let (mut completed, mut failed, mut skipped) = (0, 0, 0);
        for step in self.steps.values() {
            match step.state {
                StepState::Completed => completed += 1,
                StepState::Failed => failed += 1,
                StepState::Skipped => skipped += 1,
                StepState::Pending | StepState::Running => {}
            }
        }
        self.total_steps = self.steps.len();
        self.completed_steps = completed;
        self.failed_steps = failed;
        self.skipped_steps = skipped;
        self.current_step = self.running_step().map(|s| s.step_id.clone());
    }

    /// Step by id
    #[inline]
    #[must_use]
    pub fn step(&self, step_id: &str) -> Option<&StepProgress> {
        self.steps.get(step_id)
    }

    /// The running step, if any
    #[must_use]
    pub fn running_step(&self) -> Option<&StepProgress> {
        self.steps.values().find(|s| s.state == StepState::Running)
    }

    /// First step in plan order that can be started: failed steps first
    /// (retry), then pending
    #[must_use]
    pub fn next_runnable_step(&self) -> Option<&StepProgress> {
        self.steps
            .values()
            .find(|s| s.state == StepState::Failed)
            .or_else(|| self.steps.values().find(|s| s.state == StepState::Pending))
    }

    /// Every step completed or skipped
    #[must_use]
    pub fn all_steps_finished(&self) -> bool {
        self.steps.values().all(|s| s.state.is_terminal())
    }

    /// Control state is done, cancelled or skipped
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PullRequestRef;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn progress() -> MigrationProgress {
        MigrationProgress::new("m1", Some(7), ["step-1", "step-2", "step-3"], at(0)).unwrap()
    }

    #[test]
    fn new_is_all_pending_draft() {
        let p = progress();
        assert_eq!(p.state, ControlState::Draft);
        assert_eq!(p.total_steps, 3);
        assert_eq!(p.completed_steps, 0);
        assert!(p.current_step.is_none());
        assert!(p.steps.values().all(|s| s.state == StepState::Pending));
    }

    #[test]
    fn duplicate_step_rejected() {
        let err = MigrationProgress::new("m1", None, ["a", "b", "a"], at(0)).unwrap_err();
        assert!(matches!(err, MigrationStateError::DuplicateStep { step_id, .. } if step_id == "a"));
    }

    #[test]
    fn running_stamps_started_once() {
        let mut p = progress();
        p.transition(ControlState::PlanApproved, at(1)).unwrap();
        p.transition(ControlState::Queued, at(2)).unwrap();
        p.transition(ControlState::Running, at(3)).unwrap();
        p.transition(ControlState::Paused, at(4)).unwrap();
        p.transition(ControlState::Running, at(5)).unwrap();
        assert_eq!(p.started_at, Some(at(3)));
        assert!(p.completed_at.is_none());
        assert_eq!(p.history.len(), 5);
    }

    #[test]
    fn terminal_stamps_completed() {
        let mut p = progress();
        p.transition(ControlState::Cancelled, at(9)).unwrap();
        assert_eq!(p.completed_at, Some(at(9)));
        assert!(p.is_terminal());
    }

    #[test]
    fn invalid_transition_leaves_snapshot() {
        let mut p = progress();
        let before = p.clone();
        let err = p.transition(ControlState::Done, at(1)).unwrap_err();
        assert!(matches!(err, MigrationStateError::InvalidTransition { .. }));
        assert_eq!(p, before);
    }

    #[test]
    fn step_lifecycle_recomputes_counters() {
        let mut p = progress();
        let pr = StepUpdate::new().with_pull_request(PullRequestRef::new(123));
        p.transition_step("step-1", StepState::Running, pr, at(1)).unwrap();
        assert_eq!(p.current_step.as_deref(), Some("step-1"));
        assert_eq!(p.step("step-1").unwrap().pull_request.as_ref().unwrap().number, 123);

        p.transition_step("step-1", StepState::Completed, StepUpdate::new(), at(2))
            .unwrap();
        assert_eq!(p.completed_steps, 1);
        assert!(p.current_step.is_none());

        p.transition_step("step-2", StepState::Running, StepUpdate::new(), at(3))
            .unwrap();
        p.transition_step("step-2", StepState::Failed, StepUpdate::new(), at(4))
            .unwrap();
        assert_eq!(p.failed_steps, 1);

        p.transition_step("step-2", StepState::Running, StepUpdate::new(), at(5))
            .unwrap();
        assert_eq!(p.step("step-2").unwrap().retry_count, 1);
        assert_eq!(p.failed_steps, 0);
        assert!(p.completed_steps + p.failed_steps + p.skipped_steps <= p.total_steps);
    }

    #[test]
    fn only_one_running_step() {
        let mut p = progress();
        p.transition_step("step-1", StepState::Running, StepUpdate::new(), at(1))
            .unwrap();
        let before = p.clone();
        let err = p
            .transition_step("step-2", StepState::Running, StepUpdate::new(), at(2))
            .unwrap_err();
        assert!(matches!(err, MigrationStateError::StepAlreadyRunning { running, .. } if running == "step-1"));
        assert_eq!(p, before);
    }

    #[test]
    fn terminal_migration_is_read_only() {
        let mut p = progress();
        p.transition(ControlState::Cancelled, at(1)).unwrap();
        let err = p
            .transition_step("step-1", StepState::Running, StepUpdate::new(), at(2))
            .unwrap_err();
        assert!(matches!(err, MigrationStateError::Terminal { .. }));
    }

    #[test]
    fn unknown_step() {
        let mut p = progress();
        let err = p
            .transition_step("step-9", StepState::Running, StepUpdate::new(), at(1))
            .unwrap_err();
        assert!(matches!(err, MigrationStateError::StepNotFound { .. }));
    }

    #[test]
    fn next_runnable_prefers_failed() {
        let mut p = progress();
        assert_eq!(p.next_runnable_step().unwrap().step_id, "step-1");
        p.transition_step("step-1", StepState::Running, StepUpdate::new(), at(1))
            .unwrap();
        p.transition_step("step-1", StepState::Completed, StepUpdate::new(), at(2))
            .unwrap();
        p.transition_step("step-2", StepState::Running, StepUpdate::new(), at(3))
            .unwrap();
        p.transition_step("step-2", StepState::Failed, StepUpdate::new(), at(4))
            .unwrap();
        assert_eq!(p.next_runnable_step().unwrap().step_id, "step-2");
        assert!(!p.all_steps_finished());
    }
}
