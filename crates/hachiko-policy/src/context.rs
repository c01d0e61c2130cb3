//! Proposed action submitted for authorization

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::NetworkMode;

/// Resources consumed (or budgeted) by the action
///
/// Values are floats so that callers can pass measured fractions; NaN is
/// tolerated and never satisfies a numeric comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceUsage {
    /// CPU utilisation in percent
    pub cpu_percent: f64,
    /// Memory in MiB
    pub memory_mb: f64,
    /// Wall-clock execution time in seconds
    pub execution_time_secs: f64,
    /// Outbound network requests
    pub network_requests: f64,
}

/// Execution environment of the agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// Environment name (e.g. `ci`, `sandbox`)
    pub name: String,
    /// Network access the sandbox provides
    pub network_mode: NetworkMode,
    /// Additional variables addressable as `environment.<name>`
    pub variables: BTreeMap<String, String>,
}

/// Action proposed by an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyContext {
    /// `owner/name`
    pub repository: String,
    /// Actor on whose behalf the action runs
    pub user: String,
    /// Files the action reads or writes
    #[serde(default)]
    pub files: Vec<String>,
    /// Shell commands, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<String>>,
    /// Resource usage, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_usage: Option<ResourceUsage>,
    /// Execution environment
    #[serde(default)]
    pub environment: Environment,
}

impl PolicyContext {
    /// Create new context for a repository and actor
    #[must_use]
    pub fn new(repository: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            user: user.into(),
            ..Self::default()
        }
    }

    /// With files
    #[must_use]
    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    /// With commands
    #[must_use]
    pub fn with_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands = Some(commands.into_iter().map(Into::into).collect());
        self
    }

    /// With resource usage
    #[inline]
    #[must_use]
    pub fn with_resource_usage(mut self, usage: ResourceUsage) -> Self {
        self.resource_usage = Some(usage);
        self
    }

    /// With environment
    #[inline]
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }
}
