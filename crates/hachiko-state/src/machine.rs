//! Load-modify-save state machine over a [`MigrationStore`]

use chrono::Utc;
use std::sync::Arc;

use crate::error::{MigrationStateError, StateResult};
use crate::progress::MigrationProgress;
use crate::store::MigrationStore;
use crate::types::{ControlState, StepState, StepUpdate, TransitionRecord};

/// Validates and persists control-plane transitions
///
/// Every mutating call loads the snapshot, applies the change in memory and
/// writes it back with a version check. Nothing is written when the change
/// is rejected.
#[derive(Clone)]
pub struct StateMachine {
    store: Arc<dyn MigrationStore>,
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine").finish_non_exhaustive()
    }
}

impl StateMachine {
    /// Create new state machine over a store
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn MigrationStore>) -> Self {
        Self { store }
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MigrationStore> {
        &self.store
    }

    /// Persist a freshly created snapshot
    ///
    /// # Errors
    /// `AlreadyExists` if a snapshot is stored under the same id.
    pub async fn create(&self, mut progress: MigrationProgress) -> StateResult<MigrationProgress> {
        let id = progress.plan_id.clone();
        if self.store.load(&id).await?.is_some() {
            return Err(MigrationStateError::AlreadyExists(id));
        }
        progress.version = 1;
        self.store.compare_and_save(&id, 0, &progress).await?;
        tracing::info!(
            "Created migration {} with {} steps",
            id,
            progress.total_steps
        );
        Ok(progress)
    }

    /// Load a snapshot
    ///
    /// # Errors
    /// `MigrationNotFound` if nothing is stored under `id`.
    pub async fn get(&self, id: &str) -> StateResult<MigrationProgress> {
        self.find(id)
            .await?
            .ok_or_else(|| MigrationStateError::MigrationNotFound(id.to_string()))
    }

    /// Load a snapshot if one exists
    ///
    /// # Errors
    /// Store failures only.
    pub async fn find(&self, id: &str) -> StateResult<Option<MigrationProgress>> {
        Ok(self.store.load(id).await?)
    }

    /// Request a control-state transition
    ///
    /// # Errors
    /// `InvalidTransition`, `MigrationNotFound` or a store error.
    pub async fn transition_migration(
        &self,
        id: &str,
        to: ControlState,
    ) -> StateResult<MigrationProgress> {
        let progress = self
            .mutate(id, |p| p.transition(to, Utc::now()))
            .await?;
        tracing::info!("Migration {} -> {}", id, to);
        Ok(progress)
    }

    /// Request a step transition, applying `update` with it
    ///
    /// # Errors
    /// `InvalidStepTransition`, `StepNotFound`, `StepAlreadyRunning`,
    /// `Terminal`, `MigrationNotFound` or a store error.
    pub async fn transition_step(
        &self,
        id: &str,
        step_id: &str,
        to: StepState,
        update: StepUpdate,
    ) -> StateResult<MigrationProgress> {
        let progress = self
            .mutate(id, |p| p.transition_step(step_id, to, update, Utc::now()))
            .await?;
        tracing::info!(
            "Migration {} step {} -> {} ({}/{} completed)",
            id,
            step_id,
            to,
            progress.completed_steps,
            progress.total_steps
        );
        Ok(progress)
    }

    /// Audit trail of accepted transitions, oldest first
    ///
    /// # Errors
    /// `MigrationNotFound` or a store error.
    pub async fn history(&self, id: &str) -> StateResult<Vec<TransitionRecord>> {
        Ok(self.get(id).await?.history)
    }

    /// Ids of every stored migration
    ///
    /// # Errors
    /// Store failures only.
    pub async fn list(&self) -> StateResult<Vec<String>> {
        Ok(self.store.list().await?)
    }

    /// Number of stored migrations currently in `state`
    ///
    /// # Errors
    /// Store failures only.
    pub async fn count_in_state(&self, state: ControlState) -> StateResult<usize> {
        let mut count = 0;
        for id in self.store.list().await? {
            if let Some(p) = self.store.load(&id).await? {
                if p.state == state {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    async fn mutate<F>(&self, id: &str, apply: F) -> StateResult<MigrationProgress>
    where
        F: FnOnce(&mut MigrationProgress) -> StateResult<()> + Send,
    {
        let mut progress = self.get(id).await?;
        let expected = progress.version;
        apply(&mut progress)?;
        progress.version = expected + 1;
        self.store.compare_and_save(id, expected, &progress).await?;
        Ok(progress)
    }
}
