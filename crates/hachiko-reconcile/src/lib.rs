//! Hachiko State Reconciler
//!
//! Turns scattered, eventually-consistent evidence (open/closed pull
//! requests, migration-document checklists) into one inferred lifecycle
//! state and the step that should run next.
//!
//! # Architecture
//!
//! ```text
//! PullRequestSource ──┐
//!                     ├─→ attribute (signal extractor) ─→ infer_state ─→ MigrationStateInfo
//! DocumentSource ─────┘         checklist (optional, failures tolerated)
//! ```
//!
//! The inference itself ([`infer_state`]) is pure; [`StateReconciler`] only
//! adds the I/O around it.

#![warn(unreachable_pub)]

pub mod document;
pub mod error;
pub mod infer;
pub mod reconciler;
pub mod source;

pub use document::{parse_checklist, ChecklistSummary, MigrationDocument, MigrationFrontmatter};
pub use error::{ReconcileError, ReconcileResult};
pub use infer::{
    compute_current_step, derive_state, infer_state, InferredMigrationState, MigrationStateInfo,
};
pub use reconciler::StateReconciler;
pub use source::{DocumentSource, PullRequestSource, SourceError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
