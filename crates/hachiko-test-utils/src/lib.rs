//! Testing utilities for the Hachiko workspace
//!
//! PR builders, in-memory collaborator fakes and snapshot fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::Utc;
use hachiko_core::{AgentDispatcher, AgentResult, AgentStatus, DispatchError};
use hachiko_policy::AuthorizedContext;
use hachiko_reconcile::{DocumentSource, PullRequestSource, SourceError};
use hachiko_signal::{PrSignal, MIGRATION_LABEL};
use hachiko_state::{ControlState, MigrationProgress};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

// ---------------------------------------------------------------------------
// Pull requests
// ---------------------------------------------------------------------------

/// Open step PR following every convention
pub fn step_pr(number: u64, migration_id: &str, step: u32) -> PrSignal {
    PrSignal::new(
        number,
        format!("Migration {migration_id}: step {step}"),
        format!("hachiko/{migration_id}-step-{step}"),
    )
    .with_label(MIGRATION_LABEL)
    .with_url(format!("https://example.test/pulls/{number}"))
}

/// Open cleanup PR
pub fn cleanup_pr(number: u64, migration_id: &str) -> PrSignal {
    PrSignal::new(
        number,
        format!("Migration {migration_id}: cleanup"),
        format!("hachiko/{migration_id}-cleanup"),
    )
    .with_label(MIGRATION_LABEL)
}

/// Unrelated PR
pub fn foreign_pr(number: u64) -> PrSignal {
    PrSignal::new(number, "Fix typo", "feature/typo")
}

// ---------------------------------------------------------------------------
// Collaborator fakes
// ---------------------------------------------------------------------------

/// Fixed PR listings
#[derive(Debug, Clone, Default)]
pub struct StaticPrSource {
    pub open: Vec<PrSignal>,
    pub closed: Vec<PrSignal>,
}

impl StaticPrSource {
    pub fn new(open: Vec<PrSignal>, closed: Vec<PrSignal>) -> Self {
        Self { open, closed }
    }
}

#[async_trait]
impl PullRequestSource for StaticPrSource {
    async fn list_open(&self, _repo: &str) -> Result<Vec<PrSignal>, SourceError> {
        Ok(self.open.clone())
    }

    async fn list_closed(&self, _repo: &str) -> Result<Vec<PrSignal>, SourceError> {
        Ok(self.closed.clone())
    }
}

/// Listing that always fails; `fail_open` selects which call fails
#[derive(Debug, Clone)]
pub struct FailingPrSource {
    pub error: SourceError,
    pub fail_open: bool,
}

impl FailingPrSource {
    pub fn new(error: SourceError) -> Self {
        Self {
            error,
            fail_open: true,
        }
    }

    pub fn closed_only(mut self) -> Self {
        self.fail_open = false;
        self
    }
}

#[async_trait]
impl PullRequestSource for FailingPrSource {
    async fn list_open(&self, _repo: &str) -> Result<Vec<PrSignal>, SourceError> {
        if self.fail_open {
            Err(self.error.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn list_closed(&self, _repo: &str) -> Result<Vec<PrSignal>, SourceError> {
        Err(self.error.clone())
    }
}

/// Documents keyed by migration id
#[derive(Debug, Clone, Default)]
pub struct StaticDocumentSource {
    documents: HashMap<String, String>,
}

impl StaticDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_document(mut self, migration_id: &str, text: impl Into<String>) -> Self {
        self.documents.insert(migration_id.to_string(), text.into());
        self
    }
}

#[async_trait]
impl DocumentSource for StaticDocumentSource {
    async fn get_document(&self, migration_id: &str) -> Result<Option<String>, SourceError> {
        Ok(self.documents.get(migration_id).cloned())
    }
}

/// Document fetch that always fails
#[derive(Debug, Clone, Default)]
pub struct FailingDocumentSource;

#[async_trait]
impl DocumentSource for FailingDocumentSource {
    async fn get_document(&self, _migration_id: &str) -> Result<Option<String>, SourceError> {
        Err(SourceError::Transport("connection reset".to_string()))
    }
}

/// What a [`ScriptedDispatcher`] does with every session
#[derive(Debug, Clone)]
pub enum AgentScript {
    /// Finish with this result after `polls` running polls
    Finish { result: AgentResult, polls: u32 },
    /// Never finish
    Hang,
    /// Refuse at submit
    Reject(String),
}

/// One submitted session
#[derive(Debug, Clone)]
pub struct Submission {
    pub repository: String,
    pub user: String,
    pub files: Vec<String>,
    pub prompt: String,
}

/// Dispatcher fake that records submissions and follows a script
#[derive(Debug)]
pub struct ScriptedDispatcher {
    script: AgentScript,
    submissions: Mutex<Vec<Submission>>,
    polls: AtomicU32,
}

impl ScriptedDispatcher {
    pub fn new(script: AgentScript) -> Self {
        Self {
            script,
            submissions: Mutex::new(Vec::new()),
            polls: AtomicU32::new(0),
        }
    }

    /// Succeeds on the first poll
    pub fn succeeding() -> Self {
        Self::new(AgentScript::Finish {
            result: AgentResult::succeeded("done").with_modified_files(["src/lib.rs"]),
            polls: 0,
        })
    }

    /// Reports failure on the first poll
    pub fn failing(reason: &str) -> Self {
        Self::new(AgentScript::Finish {
            result: AgentResult::failed(reason),
            polls: 0,
        })
    }

    pub fn hanging() -> Self {
        Self::new(AgentScript::Hang)
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    pub fn poll_count(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentDispatcher for ScriptedDispatcher {
    async fn submit(
        &self,
        context: &AuthorizedContext,
        prompt: &str,
    ) -> Result<String, DispatchError> {
        if let AgentScript::Reject(reason) = &self.script {
            return Err(DispatchError::Rejected(reason.clone()));
        }
        let ctx = context.context();
        let mut submissions = self.submissions.lock();
        submissions.push(Submission {
            repository: ctx.repository.clone(),
            user: ctx.user.clone(),
            files: ctx.files.clone(),
            prompt: prompt.to_string(),
        });
        Ok(format!("session-{}", submissions.len()))
    }

    async fn poll(&self, _session_id: &str) -> Result<AgentStatus, DispatchError> {
        let seen = self.polls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            AgentScript::Finish { result, polls } if seen >= *polls => {
                Ok(AgentStatus::Finished(result.clone()))
            }
            AgentScript::Finish { .. } | AgentScript::Hang => Ok(AgentStatus::Running),
            AgentScript::Reject(reason) => Err(DispatchError::UnknownSession(reason.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Draft snapshot with steps `step-1..=step-{steps}` and a `cleanup` step
pub fn sample_progress(migration_id: &str, steps: u32) -> MigrationProgress {
    let ids = (1..=steps)
        .map(|n| format!("step-{n}"))
        .chain(std::iter::once("cleanup".to_string()));
    MigrationProgress::new(migration_id, Some(42), ids, Utc::now()).unwrap()
}

/// Snapshot moved through approval into `queued`
pub fn queued_progress(migration_id: &str, steps: u32) -> MigrationProgress {
    let mut progress = sample_progress(migration_id, steps);
    progress.transition(ControlState::PlanApproved, Utc::now()).unwrap();
    progress.transition(ControlState::Queued, Utc::now()).unwrap();
    progress
}

/// Migration document with `total` checklist items, the first `done` checked
pub fn checklist_doc(migration_id: &str, total: u32, done: u32) -> String {
    let mut doc = format!("---\nid: {migration_id}\ntitle: Sample migration\n---\n\n# Plan\n\n");
    for i in 1..=total {
        let mark = if i <= done { "x" } else { " " };
        doc.push_str(&format!("- [{mark}] Task {i}\n"));
    }
    doc
}
