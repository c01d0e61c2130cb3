//! Hachiko State Machine
//!
//! Explicit, persisted control-plane state for migrations and their steps.
//!
//! - [`MigrationProgress`]: the canonical snapshot, mutated only through
//!   validated transitions, counters recomputed from step data
//! - [`transitions`]: the control and step adjacency tables
//! - [`MigrationStore`]: `load`/`save` persistence boundary with a
//!   version-checked `compare_and_save`
//! - [`StateMachine`]: load-modify-save over a store

#![warn(unreachable_pub)]

pub mod error;
pub mod machine;
pub mod progress;
pub mod store;
pub mod transitions;
pub mod types;

pub use error::{MigrationStateError, StateResult, StoreError};
pub use machine::StateMachine;
pub use progress::MigrationProgress;
pub use store::{InMemoryStore, JsonFileStore, MigrationStore};
pub use transitions::{
    allowed_control_transitions, allowed_step_transitions, is_control_transition_allowed,
    is_step_transition_allowed,
};
pub use types::{
    ControlState, PullRequestRef, StepProgress, StepState, StepUpdate, TransitionRecord,
    TransitionSubject,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
