//! Hachiko Signal Extractor
//!
//! Decides whether a pull request belongs to a migration, and which step,
//! from its branch name, title, labels and body. Everything here is pure:
//! no I/O, no clock.
//!
//! # Example
//!
//! ```rust
//! use hachiko_signal::{extract_migration_id, PrSignal};
//!
//! let pr = PrSignal::new(42, "Add JSDoc comments", "hachiko/add-jsdoc-comments");
//! assert_eq!(extract_migration_id(&pr).as_deref(), Some("add-jsdoc-comments"));
//! ```

#![warn(unreachable_pub)]

pub mod conventions;
pub mod error;
pub mod extract;
pub mod types;
pub mod validation;

pub use conventions::{
    branch_name, is_valid_migration_id, tracking_comment, tracking_token, MIGRATION_LABEL,
};
pub use error::SignalError;
pub use extract::{
    detect_hachiko_pr, extract, extract_migration_id, extract_step, is_migration_pr, Extraction,
    ExtractionSource,
};
pub use types::{HachikoPr, PrSignal, PrState, StepRef};
pub use validation::{validate_hachiko_pr, RemediationHint, ValidationReport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
