//! Migration orchestrator
//!
//! Glue between the reconciled (inferred) state, the explicit control-plane
//! snapshot and the policy gate. All collaborators are injected handles.
//!
//! # Workflow
//! 1. [`plan_next`](MigrationOrchestrator::plan_next) decides what should
//!    happen next for a migration
//! 2. [`execute_step`](MigrationOrchestrator::execute_step) authorizes,
//!    dispatches and records one step attempt
//! 3. [`apply_pr_event`](MigrationOrchestrator::apply_pr_event) folds PR
//!    lifecycle events into the step state

use chrono::Utc;
use hachiko_policy::{AuthorizedContext, PolicyContext, PolicyEngine};
use hachiko_reconcile::{InferredMigrationState, StateReconciler};
use hachiko_signal::{
    extract, extract_step, validate_hachiko_pr, PrSignal, PrState, StepRef, MIGRATION_LABEL,
};
use hachiko_state::{
    is_control_transition_allowed, ControlState, MigrationProgress, MigrationStateError,
    PullRequestRef, StateMachine, StepProgress, StepState, StepUpdate,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::OrchestratorSettings;
use crate::dispatch::{AgentDispatcher, AgentResult, AgentStatus, DispatchError};
use crate::error::{HachikoError, HachikoResult};

/// Why nothing should be dispatched right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleReason {
    /// No control-plane snapshot exists for the migration
    NotTracked,
    /// Plan not yet approved or queued
    NotReady(ControlState),
    /// Paused, failed, cancelled or skipped
    Halted(ControlState),
    /// A step is already running
    StepRunning(String),
    /// The next step used up its attempts
    AttemptsExhausted(String),
    /// Too many migrations running
    ConcurrencyLimit {
        /// Currently running
        running: usize,
        /// Configured limit
        limit: usize,
    },
    /// No pending or failed step left, but not all are finished
    NothingRunnable,
}

impl fmt::Display for IdleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotTracked => f.write_str("migration is not tracked"),
            Self::NotReady(state) => write!(f, "migration is {state}, not queued"),
            Self::Halted(state) => write!(f, "migration is {state}"),
            Self::StepRunning(step) => write!(f, "step {step} is running"),
            Self::AttemptsExhausted(step) => write!(f, "step {step} exhausted its attempts"),
            Self::ConcurrencyLimit { running, limit } => {
                write!(f, "{running} migration(s) running, limit is {limit}")
            }
            Self::NothingRunnable => f.write_str("no runnable step"),
        }
    }
}

/// Decision for a migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextAction {
    /// Dispatch an agent for this step
    Dispatch {
        /// Step id
        step_id: String,
    },
    /// A PR for this step is open; wait for review
    AwaitReview {
        /// Step id
        step_id: String,
    },
    /// All work is done
    Complete,
    /// Nothing to do
    Idle {
        /// Why
        reason: IdleReason,
    },
}

/// Result of one step attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Agent succeeded; step completed
    Completed(AgentResult),
    /// Agent reported failure; step failed
    Failed(AgentResult),
    /// Agent did not finish in time; step failed
    TimedOut {
        /// Budget that was exceeded
        after: Duration,
    },
}

/// Coordinates reconciliation, control-plane state, policy and dispatch
#[derive(Clone)]
pub struct MigrationOrchestrator {
    reconciler: StateReconciler,
    machine: StateMachine,
    policy: Arc<PolicyEngine>,
    dispatcher: Arc<dyn AgentDispatcher>,
    settings: OrchestratorSettings,
}

impl fmt::Debug for MigrationOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationOrchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl MigrationOrchestrator {
    /// Create new orchestrator from injected handles
    #[must_use]
    pub fn new(
        reconciler: StateReconciler,
        machine: StateMachine,
        policy: Arc<PolicyEngine>,
        dispatcher: Arc<dyn AgentDispatcher>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            reconciler,
            machine,
            policy,
            dispatcher,
            settings,
        }
    }

    /// State machine handle
    #[inline]
    #[must_use]
    pub fn state_machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Settings
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Decide what should happen next for a migration
    ///
    /// # Errors
    /// PR-listing failures and store failures.
    pub async fn plan_next(&self, repo: &str, migration_id: &str) -> HachikoResult<NextAction> {
        let info = self.reconciler.reconcile(repo, migration_id).await?;
        let Some(progress) = self.machine.find(migration_id).await? else {
            return Ok(NextAction::Idle {
                reason: IdleReason::NotTracked,
            });
        };
        tracing::debug!(
            "Planning {}: inferred {} (step {}), control {}",
            migration_id,
            info.state,
            info.current_step,
            progress.state
        );

        if info.state == InferredMigrationState::Completed || progress.state == ControlState::Done
        {
            return Ok(NextAction::Complete);
        }
        match progress.state {
            ControlState::Draft | ControlState::PlanApproved => {
                return Ok(idle(IdleReason::NotReady(progress.state)));
            }
            ControlState::Paused
            | ControlState::Failed
            | ControlState::Cancelled
            | ControlState::Skipped => return Ok(idle(IdleReason::Halted(progress.state))),
            ControlState::Queued | ControlState::Running | ControlState::AwaitingReview => {}
            ControlState::Done => return Ok(NextAction::Complete),
        }

        let reconciled_step = StepRef::Number(info.current_step);
        if info.state == InferredMigrationState::Active {
            let step_id = step_id_for(&progress, reconciled_step)
                .unwrap_or_else(|| reconciled_step.to_string());
            return Ok(NextAction::AwaitReview { step_id });
        }
        if let Some(running) = progress.running_step() {
            return Ok(idle(IdleReason::StepRunning(running.step_id.clone())));
        }

        let candidate = step_id_for(&progress, reconciled_step)
            .filter(|id| progress.step(id).is_some_and(|s| !s.state.is_terminal()))
            .or_else(|| progress.next_runnable_step().map(|s| s.step_id.clone()));
        let Some(step_id) = candidate else {
            return Ok(if progress.all_steps_finished() {
                NextAction::Complete
            } else {
                idle(IdleReason::NothingRunnable)
            });
        };

        if let Some(step) = progress.step(&step_id) {
            if attempts_made(step) >= self.settings.max_attempts_per_step {
                return Ok(idle(IdleReason::AttemptsExhausted(step_id)));
            }
        }
        if progress.state == ControlState::Queued {
            let running = self.machine.count_in_state(ControlState::Running).await?;
            if running >= self.settings.max_concurrent_migrations {
                return Ok(idle(IdleReason::ConcurrencyLimit {
                    running,
                    limit: self.settings.max_concurrent_migrations,
                }));
            }
        }
        Ok(NextAction::Dispatch { step_id })
    }

    /// Authorize, dispatch and record one attempt of a step
    ///
    /// A blocked context leaves the snapshot untouched. A timeout is
    /// recorded as a step failure. When the last attempt fails the
    /// migration moves to `failed`.
    ///
    /// # Errors
    /// - `AttemptsExhausted` when no attempt is left
    /// - `ConcurrencyLimit` when too many migrations are running
    /// - policy, state and dispatch errors
    pub async fn execute_step(
        &self,
        migration_id: &str,
        step_id: &str,
        context: PolicyContext,
        prompt: &str,
    ) -> HachikoResult<StepOutcome> {
        let progress = self.machine.get(migration_id).await?;
        let step = progress
            .step(step_id)
            .ok_or_else(|| MigrationStateError::StepNotFound {
                migration_id: migration_id.to_string(),
                step_id: step_id.to_string(),
            })?;
        let attempts = attempts_made(step);
        if attempts >= self.settings.max_attempts_per_step {
            return Err(HachikoError::AttemptsExhausted {
                migration_id: migration_id.to_string(),
                step_id: step_id.to_string(),
                attempts,
            });
        }

        // Dry run so a rejected request changes nothing
        progress
            .clone()
            .transition_step(step_id, StepState::Running, StepUpdate::new(), Utc::now())?;
        if progress.state != ControlState::Running
            && !is_control_transition_allowed(progress.state, ControlState::Running)
        {
            return Err(MigrationStateError::InvalidTransition {
                migration_id: migration_id.to_string(),
                from: progress.state,
                to: ControlState::Running,
            }
            .into());
        }

        let authorized = self.policy.authorize(context)?;

        if progress.state != ControlState::Running {
            if progress.state != ControlState::AwaitingReview {
                let running = self.machine.count_in_state(ControlState::Running).await?;
                if running >= self.settings.max_concurrent_migrations {
                    return Err(HachikoError::ConcurrencyLimit {
                        running,
                        limit: self.settings.max_concurrent_migrations,
                    });
                }
            }
            self.machine
                .transition_migration(migration_id, ControlState::Running)
                .await?;
        }
        let agent = authorized.context().user.clone();
        self.machine
            .transition_step(
                migration_id,
                step_id,
                StepState::Running,
                StepUpdate::new().with_agent(agent),
            )
            .await?;
        tracing::info!(
            "Dispatching {} step {} (attempt {}/{})",
            migration_id,
            step_id,
            attempts + 1,
            self.settings.max_attempts_per_step
        );

        let budget = self.settings.step_timeout();
        match tokio::time::timeout(budget, self.run_agent(&authorized, prompt)).await {
            Ok(Ok(result)) if result.success => {
                self.machine
                    .transition_step(migration_id, step_id, StepState::Completed, StepUpdate::new())
                    .await?;
                self.machine
                    .transition_migration(migration_id, ControlState::AwaitingReview)
                    .await?;
                Ok(StepOutcome::Completed(result))
            }
            Ok(Ok(result)) => {
                let reason = result.error.as_deref().unwrap_or("agent reported failure");
                self.record_failure(migration_id, step_id, attempts + 1, reason)
                    .await?;
                Ok(StepOutcome::Failed(result))
            }
            Ok(Err(e)) => {
                self.record_failure(migration_id, step_id, attempts + 1, &e.to_string())
                    .await?;
                Err(e.into())
            }
            Err(_) => {
                self.record_failure(migration_id, step_id, attempts + 1, "timed out")
                    .await?;
                Ok(StepOutcome::TimedOut { after: budget })
            }
        }
    }

    /// Fold a PR lifecycle event into step state
    ///
    /// Opened marks the step running, merged marks it completed, closed
    /// without merge marks it failed. Returns the updated snapshot, or
    /// `None` when the event did not change anything.
    ///
    /// # Errors
    /// `UnrecognizedPullRequest` when a PR carries the migration label but
    /// cannot be attributed; state and store errors.
    pub async fn apply_pr_event(&self, pr: &PrSignal) -> HachikoResult<Option<MigrationProgress>> {
        let Some(extraction) = extract(pr) else {
            if pr.has_label(MIGRATION_LABEL) {
                return Err(HachikoError::UnrecognizedPullRequest {
                    number: pr.number,
                    hints: validate_hachiko_pr(pr).hints,
                });
            }
            tracing::debug!("Ignoring pull request #{}: not a migration PR", pr.number);
            return Ok(None);
        };
        let migration_id = extraction.migration_id;
        let step = extract_step(pr);

        let Some(progress) = self.machine.find(&migration_id).await? else {
            tracing::debug!("Ignoring PR #{}: migration {} not tracked", pr.number, migration_id);
            return Ok(None);
        };
        if progress.is_terminal() {
            tracing::debug!(
                "Ignoring PR #{}: migration {} is {}",
                pr.number,
                migration_id,
                progress.state
            );
            return Ok(None);
        }
        let Some(step_id) = step_id_for(&progress, step) else {
            tracing::debug!(
                "Ignoring PR #{}: step {} unknown to {}",
                pr.number,
                step,
                migration_id
            );
            return Ok(None);
        };
        let current = progress.step(&step_id).map_or(StepState::Pending, |s| s.state);
        let with_pr = StepUpdate::new().with_pull_request(PullRequestRef {
            number: pr.number,
            url: pr.url.clone(),
        });

        let updated = match (pr.state(), current) {
            (PrState::Open, StepState::Pending | StepState::Failed) => Some(
                self.machine
                    .transition_step(&migration_id, &step_id, StepState::Running, with_pr)
                    .await?,
            ),
            (PrState::Merged, StepState::Pending | StepState::Failed) => {
                self.machine
                    .transition_step(&migration_id, &step_id, StepState::Running, with_pr)
                    .await?;
                Some(self.complete_step(&migration_id, &step_id, StepUpdate::new()).await?)
            }
            (PrState::Merged, StepState::Running) => {
                Some(self.complete_step(&migration_id, &step_id, with_pr).await?)
            }
            (PrState::Merged, StepState::Completed) => self.finish_if_done(&migration_id).await?,
            (PrState::Closed, StepState::Running) => Some(
                self.machine
                    .transition_step(&migration_id, &step_id, StepState::Failed, with_pr)
                    .await?,
            ),
            (state, step_state) => {
                tracing::debug!(
                    "PR #{} ({:?}) leaves {} step {} {}",
                    pr.number,
                    state,
                    migration_id,
                    step_id,
                    step_state
                );
                None
            }
        };
        Ok(updated)
    }

    async fn run_agent(
        &self,
        context: &AuthorizedContext,
        prompt: &str,
    ) -> Result<AgentResult, DispatchError> {
        let session = self.dispatcher.submit(context, prompt).await?;
        tracing::debug!("Agent session {} submitted", session);
        loop {
            match self.dispatcher.poll(&session).await? {
                AgentStatus::Finished(result) => return Ok(result),
                AgentStatus::Queued | AgentStatus::Running => {
                    tokio::time::sleep(self.settings.poll_interval()).await;
                }
            }
        }
    }

    async fn record_failure(
        &self,
        migration_id: &str,
        step_id: &str,
        attempts: u32,
        reason: &str,
    ) -> HachikoResult<()> {
        tracing::warn!(
            "Step {} of {} failed (attempt {}/{}): {}",
            step_id,
            migration_id,
            attempts,
            self.settings.max_attempts_per_step,
            reason
        );
        self.machine
            .transition_step(migration_id, step_id, StepState::Failed, StepUpdate::new())
            .await?;
        if attempts >= self.settings.max_attempts_per_step {
            self.machine
                .transition_migration(migration_id, ControlState::Failed)
                .await?;
        }
        Ok(())
    }

    async fn complete_step(
        &self,
        migration_id: &str,
        step_id: &str,
        update: StepUpdate,
    ) -> HachikoResult<MigrationProgress> {
        let progress = self
            .machine
            .transition_step(migration_id, step_id, StepState::Completed, update)
            .await?;
        Ok(self.finish_if_done(migration_id).await?.unwrap_or(progress))
    }

    /// Move a migration whose steps are all finished to `done`
    async fn finish_if_done(&self, migration_id: &str) -> HachikoResult<Option<MigrationProgress>> {
        let mut progress = self.machine.get(migration_id).await?;
        if !progress.all_steps_finished() {
            return Ok(None);
        }
        if progress.state == ControlState::Running {
            progress = self
                .machine
                .transition_migration(migration_id, ControlState::AwaitingReview)
                .await?;
        }
        if progress.state == ControlState::AwaitingReview {
            progress = self
                .machine
                .transition_migration(migration_id, ControlState::Done)
                .await?;
            tracing::info!("Migration {} done", migration_id);
            return Ok(Some(progress));
        }
        Ok(None)
    }
}

fn idle(reason: IdleReason) -> NextAction {
    NextAction::Idle { reason }
}

/// Attempts already made for a step
fn attempts_made(step: &StepProgress) -> u32 {
    match step.state {
        StepState::Pending => 0,
        _ => step.retry_count + 1,
    }
}

/// Map an extracted step to a plan step id (`step-{n}` or `{n}`, `cleanup`)
#[must_use]
pub fn step_id_for(progress: &MigrationProgress, step: StepRef) -> Option<String> {
    let candidates = match step {
        StepRef::Number(n) => vec![format!("step-{n}"), n.to_string()],
        StepRef::Cleanup => vec!["cleanup".to_string()],
        StepRef::Unspecified => return None,
    };
    candidates.into_iter().find(|id| progress.steps.contains_key(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(steps: &[&str]) -> MigrationProgress {
        MigrationProgress::new("m1", None, steps.iter().copied(), Utc::now()).unwrap()
    }

    #[test]
    fn step_ids_map_both_conventions() {
        let p = progress(&["step-1", "step-2", "cleanup"]);
        assert_eq!(step_id_for(&p, StepRef::Number(2)).as_deref(), Some("step-2"));
        assert_eq!(step_id_for(&p, StepRef::Cleanup).as_deref(), Some("cleanup"));
        assert_eq!(step_id_for(&p, StepRef::Number(9)), None);
        assert_eq!(step_id_for(&p, StepRef::Unspecified), None);

        let numeric = progress(&["1", "2"]);
        assert_eq!(step_id_for(&numeric, StepRef::Number(1)).as_deref(), Some("1"));
    }

    #[test]
    fn attempts_count_retries() {
        let mut step = StepProgress::pending("s");
        assert_eq!(attempts_made(&step), 0);
        step.state = StepState::Failed;
        assert_eq!(attempts_made(&step), 1);
        step.retry_count = 2;
        assert_eq!(attempts_made(&step), 3);
    }

    #[test]
    fn idle_reason_display() {
        assert_eq!(
            IdleReason::Halted(ControlState::Paused).to_string(),
            "migration is paused"
        );
    }
}
