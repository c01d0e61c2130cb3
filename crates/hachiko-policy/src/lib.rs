//! Hachiko Policy Engine
//!
//! Authorizes or blocks a proposed agent action (files, commands, resource
//! usage, actor) against a configurable rule set.
//!
//! A rule fires when all of its conditions hold. Firing routes by severity:
//! `info`/`warning` become warnings, `error`/`critical` become violations and
//! block the action. Built-in rules are seeded from [`PolicyConfig`] at
//! [`PolicyEngine::initialize`].
//!
//! # Example
//!
//! ```
//! use hachiko_policy::{PolicyConfig, PolicyContext, PolicyEngine};
//!
//! let engine = PolicyEngine::new(PolicyConfig::default());
//! engine.initialize().unwrap();
//!
//! let ctx = PolicyContext::new("acme/web", "alice").with_files([".env.production"]);
//! let result = engine.evaluate(&ctx).unwrap();
//! assert!(!result.allowed);
//! ```

#![warn(unreachable_pub)]

pub mod builtin;
pub mod condition;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod rule;

pub use condition::{Condition, ConditionValue, FieldValue, Operator, PolicyField};
pub use config::{NetworkMode, PolicyConfig};
pub use context::{Environment, PolicyContext, ResourceUsage};
pub use engine::{AuthorizedContext, PolicyEngine};
pub use error::{PolicyError, RuleError};
pub use rule::{
    PolicyAction, PolicyEvaluationResult, PolicyRule, PolicyRuleType, PolicyViolation, Severity,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
