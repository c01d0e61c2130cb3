//! Hachiko Core
//!
//! Orchestrator glue over the signal extractor, state reconciler, state
//! machine and policy engine, plus process configuration, the agent-dispatch
//! interface and tracing setup.
//!
//! # Example
//!
//! ```no_run
//! use hachiko_core::{HachikoConfig, TracingOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! hachiko_core::init_tracing(&TracingOptions::default())?;
//! let config = HachikoConfig::from_path("hachiko.toml")?;
//! tracing::info!("Max concurrent migrations: {}", config.orchestrator.max_concurrent_migrations);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod telemetry;

pub use config::{ConfigError, HachikoConfig, OrchestratorSettings};
pub use dispatch::{AgentDispatcher, AgentResult, AgentStatus, DispatchError};
pub use error::{HachikoError, HachikoResult};
pub use orchestrator::{step_id_for, IdleReason, MigrationOrchestrator, NextAction, StepOutcome};
pub use telemetry::{init_tracing, TelemetryError, TracingOptions};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
