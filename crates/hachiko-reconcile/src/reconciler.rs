//! Async reconciliation against live collaborators

use chrono::Utc;
use hachiko_signal::{detect_hachiko_pr, HachikoPr, PrSignal, PrState};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::document::MigrationDocument;
use crate::error::{ReconcileError, ReconcileResult};
use crate::infer::{infer_state, MigrationStateInfo};
use crate::source::{DocumentSource, PullRequestSource};

/// Reconstructs migration state from PR listings and migration documents
#[derive(Clone)]
pub struct StateReconciler {
    pull_requests: Arc<dyn PullRequestSource>,
    documents: Arc<dyn DocumentSource>,
}

impl std::fmt::Debug for StateReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateReconciler").finish_non_exhaustive()
    }
}

/// Open and closed PR listings of one repository
struct Listing {
    open: Vec<PrSignal>,
    closed: Vec<PrSignal>,
}

impl StateReconciler {
    /// Create a reconciler over the given sources
    #[inline]
    #[must_use]
    pub fn new(
        pull_requests: Arc<dyn PullRequestSource>,
        documents: Arc<dyn DocumentSource>,
    ) -> Self {
        Self {
            pull_requests,
            documents,
        }
    }

    /// Reconcile one migration
    ///
    /// # Errors
    /// Fails only when a PR listing cannot be fetched.
    pub async fn reconcile(
        &self,
        repo: &str,
        migration_id: &str,
    ) -> ReconcileResult<MigrationStateInfo> {
        let listing = self.fetch_listing(repo).await?;
        Ok(self.reconcile_from(&listing, migration_id).await)
    }

    /// Reconcile several migrations against a single PR listing
    ///
    /// # Errors
    /// Fails only when a PR listing cannot be fetched.
    pub async fn reconcile_many(
        &self,
        repo: &str,
        migration_ids: &[String],
    ) -> ReconcileResult<Vec<MigrationStateInfo>> {
        let listing = self.fetch_listing(repo).await?;
        let mut states = Vec::with_capacity(migration_ids.len());
        for id in migration_ids {
            states.push(self.reconcile_from(&listing, id).await);
        }
        Ok(states)
    }

    /// Every migration id referenced by any open or closed PR, sorted
    ///
    /// # Errors
    /// Fails when a PR listing cannot be fetched.
    pub async fn discover_migrations(&self, repo: &str) -> ReconcileResult<Vec<String>> {
        let listing = self.fetch_listing(repo).await?;
        let ids: BTreeSet<String> = listing
            .open
            .iter()
            .chain(listing.closed.iter())
            .filter_map(detect_hachiko_pr)
            .map(|pr| pr.migration_id)
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn fetch_listing(&self, repo: &str) -> ReconcileResult<Listing> {
        let open = async {
            self.pull_requests
                .list_open(repo)
                .await
                .map_err(|source| ReconcileError::PullRequestListing {
                    operation: "list open pull requests",
                    repo: repo.to_string(),
                    source,
                })
        };
        let closed = async {
            self.pull_requests
                .list_closed(repo)
                .await
                .map_err(|source| ReconcileError::PullRequestListing {
                    operation: "list closed pull requests",
                    repo: repo.to_string(),
                    source,
                })
        };
        let (open, closed) = futures::try_join!(open, closed)?;
        tracing::debug!(
            "Listed {} open and {} closed pull requests in {}",
            open.len(),
            closed.len(),
            repo
        );
        Ok(Listing { open, closed })
    }

    async fn reconcile_from(&self, listing: &Listing, migration_id: &str) -> MigrationStateInfo {
        let open = attribute(&listing.open, migration_id, false);
        let closed = attribute(&listing.closed, migration_id, true);
        let document = self.fetch_document(migration_id).await;
        let checklist = document.as_ref().map(|d| d.checklist);

        infer_state(migration_id, open, closed, checklist.as_ref(), Utc::now())
    }

    /// Fetch and parse the migration document; any failure degrades to `None`
    async fn fetch_document(&self, migration_id: &str) -> Option<MigrationDocument> {
        match self.documents.get_document(migration_id).await {
            Ok(Some(text)) => Some(MigrationDocument::parse(&text)),
            Ok(None) => {
                tracing::debug!("No migration document for {}", migration_id);
                None
            }
            Err(e) => {
                tracing::warn!(
                    "Migration document fetch failed for {}, using PR signals only: {}",
                    migration_id,
                    e
                );
                None
            }
        }
    }
}

/// Keep the PRs of one migration; entries from the closed listing are always closed
fn attribute(signals: &[PrSignal], migration_id: &str, from_closed: bool) -> Vec<HachikoPr> {
    signals
        .iter()
        .filter_map(detect_hachiko_pr)
        .filter(|pr| pr.migration_id == migration_id)
        .map(|mut pr| {
            if from_closed && pr.state == PrState::Open {
                pr.state = PrState::Closed;
            }
            pr
        })
        .collect()
}
