//! Orchestrator tests over in-memory collaborators

use hachiko_core::{
    HachikoError, IdleReason, MigrationOrchestrator, NextAction, OrchestratorSettings, StepOutcome,
};
use hachiko_policy::{PolicyConfig, PolicyContext, PolicyEngine, PolicyError};
use hachiko_reconcile::StateReconciler;
use hachiko_signal::{PrSignal, RemediationHint, MIGRATION_LABEL};
use hachiko_state::{ControlState, InMemoryStore, StateMachine, StepState};
use hachiko_test_utils::{
    checklist_doc, cleanup_pr, foreign_pr, queued_progress, sample_progress, step_pr,
    ScriptedDispatcher, StaticDocumentSource, StaticPrSource,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const REPO: &str = "acme/widgets";

struct Harness {
    orchestrator: MigrationOrchestrator,
    dispatcher: Arc<ScriptedDispatcher>,
}

impl Harness {
    fn new(prs: StaticPrSource, docs: StaticDocumentSource, dispatcher: ScriptedDispatcher) -> Self {
        Self::with_settings(prs, docs, dispatcher, OrchestratorSettings::default())
    }

    fn with_settings(
        prs: StaticPrSource,
        docs: StaticDocumentSource,
        dispatcher: ScriptedDispatcher,
        settings: OrchestratorSettings,
    ) -> Self {
        let policy = PolicyEngine::new(PolicyConfig::default());
        policy.initialize().unwrap();
        let dispatcher = Arc::new(dispatcher);
        let orchestrator = MigrationOrchestrator::new(
            StateReconciler::new(Arc::new(prs), Arc::new(docs)),
            StateMachine::new(Arc::new(InMemoryStore::new())),
            Arc::new(policy),
            dispatcher.clone(),
            settings,
        );
        Self {
            orchestrator,
            dispatcher,
        }
    }

    fn machine(&self) -> &StateMachine {
        self.orchestrator.state_machine()
    }
}

fn agent_context() -> PolicyContext {
    PolicyContext::new(REPO, "mock-agent").with_files(["src/lib.rs", "src/main.rs"])
}

fn idle(reason: IdleReason) -> NextAction {
    NextAction::Idle { reason }
}

// ---------------------------------------------------------------------------
// plan_next
// ---------------------------------------------------------------------------

#[tokio::test]
async fn untracked_migration_is_idle() {
    let h = Harness::new(
        StaticPrSource::default(),
        StaticDocumentSource::new(),
        ScriptedDispatcher::succeeding(),
    );
    assert_eq!(
        h.orchestrator.plan_next(REPO, "m1").await.unwrap(),
        idle(IdleReason::NotTracked)
    );
}

#[tokio::test]
async fn draft_migration_is_not_ready() {
    let h = Harness::new(
        StaticPrSource::default(),
        StaticDocumentSource::new(),
        ScriptedDispatcher::succeeding(),
    );
    h.machine().create(sample_progress("m1", 2)).await.unwrap();
    assert_eq!(
        h.orchestrator.plan_next(REPO, "m1").await.unwrap(),
        idle(IdleReason::NotReady(ControlState::Draft))
    );
}

#[tokio::test]
async fn queued_migration_dispatches_first_step() {
    let h = Harness::new(
        StaticPrSource::default(),
        StaticDocumentSource::new(),
        ScriptedDispatcher::succeeding(),
    );
    h.machine().create(queued_progress("m1", 3)).await.unwrap();
    assert_eq!(
        h.orchestrator.plan_next(REPO, "m1").await.unwrap(),
        NextAction::Dispatch {
            step_id: "step-1".to_string()
        }
    );
}

#[tokio::test]
async fn merged_prs_advance_the_planned_step() {
    let prs = StaticPrSource::new(
        vec![],
        vec![step_pr(10, "m1", 1).merged(), step_pr(11, "m1", 2).merged()],
    );
    let h = Harness::new(prs, StaticDocumentSource::new(), ScriptedDispatcher::succeeding());
    h.machine().create(queued_progress("m1", 3)).await.unwrap();
    assert_eq!(
        h.orchestrator.plan_next(REPO, "m1").await.unwrap(),
        NextAction::Dispatch {
            step_id: "step-3".to_string()
        }
    );
}

#[tokio::test]
async fn open_pr_awaits_review() {
    let prs = StaticPrSource::new(vec![step_pr(7, "m1", 2)], vec![step_pr(6, "m1", 1).merged()]);
    let h = Harness::new(prs, StaticDocumentSource::new(), ScriptedDispatcher::succeeding());
    h.machine().create(queued_progress("m1", 3)).await.unwrap();
    assert_eq!(
        h.orchestrator.plan_next(REPO, "m1").await.unwrap(),
        NextAction::AwaitReview {
            step_id: "step-2".to_string()
        }
    );
}

#[tokio::test]
async fn finished_checklist_completes_despite_open_pr() {
    let prs = StaticPrSource::new(vec![step_pr(7, "m1", 2)], vec![]);
    let docs = StaticDocumentSource::new().with_document("m1", checklist_doc("m1", 3, 3));
    let h = Harness::new(prs, docs, ScriptedDispatcher::succeeding());
    h.machine().create(queued_progress("m1", 3)).await.unwrap();
    assert_eq!(
        h.orchestrator.plan_next(REPO, "m1").await.unwrap(),
        NextAction::Complete
    );
}

#[tokio::test]
async fn concurrency_limit_holds_back_queued_migrations() {
    let h = Harness::new(
        StaticPrSource::default(),
        StaticDocumentSource::new(),
        ScriptedDispatcher::succeeding(),
    );
    h.machine().create(queued_progress("m1", 1)).await.unwrap();
    h.machine().create(queued_progress("m2", 1)).await.unwrap();
    h.machine()
        .transition_migration("m1", ControlState::Running)
        .await
        .unwrap();

    assert_eq!(
        h.orchestrator.plan_next(REPO, "m2").await.unwrap(),
        idle(IdleReason::ConcurrencyLimit {
            running: 1,
            limit: 1
        })
    );

    let err = h
        .orchestrator
        .execute_step("m2", "step-1", agent_context(), "go")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONCURRENCY_LIMIT");
    assert!(err.is_retryable());
    assert_eq!(
        h.machine().get("m2").await.unwrap().state,
        ControlState::Queued
    );
    assert!(h.dispatcher.submissions().is_empty());
}

// ---------------------------------------------------------------------------
// execute_step
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_step_awaits_review() {
    let h = Harness::new(
        StaticPrSource::default(),
        StaticDocumentSource::new(),
        ScriptedDispatcher::succeeding(),
    );
    h.machine().create(queued_progress("m1", 2)).await.unwrap();

    let outcome = h
        .orchestrator
        .execute_step("m1", "step-1", agent_context(), "Migrate step 1")
        .await
        .unwrap();
    assert!(matches!(outcome, StepOutcome::Completed(ref r) if r.success));

    let progress = h.machine().get("m1").await.unwrap();
    assert_eq!(progress.state, ControlState::AwaitingReview);
    let step = progress.step("step-1").unwrap();
    assert_eq!(step.state, StepState::Completed);
    assert_eq!(step.agent.as_deref(), Some("mock-agent"));
    assert_eq!(progress.completed_steps, 1);

    let submissions = h.dispatcher.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].prompt, "Migrate step 1");
    assert_eq!(submissions[0].repository, REPO);
}

#[tokio::test]
async fn blocked_context_leaves_snapshot_untouched() {
    let h = Harness::new(
        StaticPrSource::default(),
        StaticDocumentSource::new(),
        ScriptedDispatcher::succeeding(),
    );
    h.machine().create(queued_progress("m1", 2)).await.unwrap();
    let before = h.machine().get("m1").await.unwrap();

    let ctx = PolicyContext::new(REPO, "mock-agent").with_files(["src/app.ts", ".env.production"]);
    let err = h
        .orchestrator
        .execute_step("m1", "step-1", ctx, "go")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "POLICY_VIOLATION");
    assert!(!err.is_retryable());
    assert!(matches!(
        err,
        HachikoError::Policy(PolicyError::Violation { ref violations }) if !violations.is_empty()
    ));

    assert_eq!(h.machine().get("m1").await.unwrap(), before);
    assert!(h.dispatcher.submissions().is_empty());
}

#[tokio::test]
async fn unknown_step_is_a_state_error() {
    let h = Harness::new(
        StaticPrSource::default(),
        StaticDocumentSource::new(),
        ScriptedDispatcher::succeeding(),
    );
    h.machine().create(queued_progress("m1", 1)).await.unwrap();
    let err = h
        .orchestrator
        .execute_step("m1", "step-9", agent_context(), "go")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MIGRATION_STATE_ERROR");
}

#[tokio::test(start_paused = true)]
async fn timeout_counts_as_failure() {
    let settings = OrchestratorSettings::default()
        .with_step_timeout_secs(60)
        .with_max_attempts(3);
    let h = Harness::with_settings(
        StaticPrSource::default(),
        StaticDocumentSource::new(),
        ScriptedDispatcher::hanging(),
        settings,
    );
    h.machine().create(queued_progress("m1", 2)).await.unwrap();

    let outcome = h
        .orchestrator
        .execute_step("m1", "step-1", agent_context(), "go")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        StepOutcome::TimedOut {
            after: Duration::from_secs(60)
        }
    );
    assert!(h.dispatcher.poll_count() >= 1);

    let progress = h.machine().get("m1").await.unwrap();
    assert_eq!(progress.step("step-1").unwrap().state, StepState::Failed);
    assert_eq!(progress.state, ControlState::Running);
    assert_eq!(progress.failed_steps, 1);
}

#[tokio::test]
async fn exhausted_attempts_fail_the_migration() {
    let settings = OrchestratorSettings::default().with_max_attempts(2);
    let h = Harness::with_settings(
        StaticPrSource::default(),
        StaticDocumentSource::new(),
        ScriptedDispatcher::failing("tests did not pass"),
        settings,
    );
    h.machine().create(queued_progress("m1", 2)).await.unwrap();

    let first = h
        .orchestrator
        .execute_step("m1", "step-1", agent_context(), "go")
        .await
        .unwrap();
    assert!(matches!(first, StepOutcome::Failed(_)));
    assert_eq!(
        h.machine().get("m1").await.unwrap().state,
        ControlState::Running
    );

    let second = h
        .orchestrator
        .execute_step("m1", "step-1", agent_context(), "go")
        .await
        .unwrap();
    assert!(matches!(second, StepOutcome::Failed(_)));
    let progress = h.machine().get("m1").await.unwrap();
    assert_eq!(progress.state, ControlState::Failed);
    assert_eq!(progress.step("step-1").unwrap().retry_count, 1);

    let err = h
        .orchestrator
        .execute_step("m1", "step-1", agent_context(), "go")
        .await
        .unwrap_err();
    assert!(matches!(err, HachikoError::AttemptsExhausted { attempts: 2, .. }));
    assert!(err.requires_human());
    assert_eq!(h.dispatcher.submissions().len(), 2);

    assert_eq!(
        h.orchestrator.plan_next(REPO, "m1").await.unwrap(),
        idle(IdleReason::Halted(ControlState::Failed))
    );
}

// ---------------------------------------------------------------------------
// apply_pr_event
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pr_lifecycle_drives_step_state() {
    let h = Harness::new(
        StaticPrSource::default(),
        StaticDocumentSource::new(),
        ScriptedDispatcher::succeeding(),
    );
    h.machine().create(queued_progress("m1", 2)).await.unwrap();

    let opened = h
        .orchestrator
        .apply_pr_event(&step_pr(21, "m1", 1))
        .await
        .unwrap()
        .unwrap();
    let step = opened.step("step-1").unwrap();
    assert_eq!(step.state, StepState::Running);
    assert_eq!(step.pull_request.as_ref().map(|pr| pr.number), Some(21));

    let merged = h
        .orchestrator
        .apply_pr_event(&step_pr(21, "m1", 1).merged())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(merged.step("step-1").unwrap().state, StepState::Completed);

    // Redelivery changes nothing
    assert!(h
        .orchestrator
        .apply_pr_event(&step_pr(21, "m1", 1).merged())
        .await
        .unwrap()
        .is_none());

    h.orchestrator
        .apply_pr_event(&step_pr(22, "m1", 2))
        .await
        .unwrap();
    let closed = h
        .orchestrator
        .apply_pr_event(&step_pr(22, "m1", 2).closed_unmerged())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closed.step("step-2").unwrap().state, StepState::Failed);
}

#[tokio::test]
async fn last_merge_finishes_the_migration() {
    let h = Harness::new(
        StaticPrSource::default(),
        StaticDocumentSource::new(),
        ScriptedDispatcher::succeeding(),
    );
    h.machine().create(queued_progress("m1", 1)).await.unwrap();
    h.orchestrator
        .execute_step("m1", "step-1", agent_context(), "go")
        .await
        .unwrap();

    // step-1 already completed by the agent; cleanup still pending
    assert!(h
        .orchestrator
        .apply_pr_event(&step_pr(30, "m1", 1).merged())
        .await
        .unwrap()
        .is_none());

    let done = h
        .orchestrator
        .apply_pr_event(&cleanup_pr(31, "m1").merged())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.state, ControlState::Done);
    assert!(done.completed_at.is_some());
    assert_eq!(
        h.orchestrator.plan_next(REPO, "m1").await.unwrap(),
        NextAction::Complete
    );
}

#[tokio::test]
async fn foreign_and_untracked_prs_are_ignored() {
    let h = Harness::new(
        StaticPrSource::default(),
        StaticDocumentSource::new(),
        ScriptedDispatcher::succeeding(),
    );
    assert!(h
        .orchestrator
        .apply_pr_event(&foreign_pr(1))
        .await
        .unwrap()
        .is_none());
    assert!(h
        .orchestrator
        .apply_pr_event(&step_pr(2, "unknown", 1))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn labelled_pr_without_conventions_gets_hints() {
    let h = Harness::new(
        StaticPrSource::default(),
        StaticDocumentSource::new(),
        ScriptedDispatcher::succeeding(),
    );
    let pr = PrSignal::new(5, "Update dependencies", "feature/deps").with_label(MIGRATION_LABEL);
    let err = h.orchestrator.apply_pr_event(&pr).await.unwrap_err();
    match &err {
        HachikoError::UnrecognizedPullRequest { number, hints } => {
            assert_eq!(*number, 5);
            assert_eq!(hints, &vec![RemediationHint::Branch, RemediationHint::Title]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.remediation().len(), 2);
}
