//! Policy configuration and built-in defaults

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PolicyError;

/// Outbound network access granted to agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// No network access at all
    None,
    /// Package registries and the forge only
    #[default]
    Restricted,
    /// Unrestricted
    Full,
}

impl NetworkMode {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Restricted => "restricted",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs for the built-in rule set
///
/// Every field has a default, so partial configuration files are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Secret-bearing file globs; touching one is blocked
    pub sensitive_globs: Vec<String>,
    /// Risky path globs (CI, VCS internals, vendored code); blocked
    pub blocked_globs: Vec<String>,
    /// Shell command substrings that are always blocked
    pub dangerous_commands: Vec<String>,
    /// Network access for agents
    pub network_mode: NetworkMode,
    /// When set, every touched file must match one of these globs
    pub allowed_globs: Option<Vec<String>>,
    /// Bot and service accounts whose actions are flagged
    pub bot_accounts: Vec<String>,
    /// Per-step execution budget in seconds
    pub step_timeout_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            sensitive_globs: to_strings(&[
                ".env",
                ".env.*",
                "*.pem",
                "*.key",
                "*.p12",
                "*.pfx",
                "id_rsa*",
                "id_ed25519*",
                "**/secrets/**",
                "credentials.json",
                ".npmrc",
                ".pypirc",
            ]),
            blocked_globs: to_strings(&[
                "**/.git/**",
                "**/.github/workflows/**",
                "**/node_modules/**",
                "**/vendor/**",
            ]),
            dangerous_commands: to_strings(&[
                "rm -rf /",
                "rm -rf ~",
                "sudo ",
                "chmod 777",
                "mkfs",
                "dd if=",
                ":(){",
                "| sh",
                "| bash",
                "git push --force",
                "> /dev/sd",
            ]),
            network_mode: NetworkMode::Restricted,
            allowed_globs: None,
            bot_accounts: to_strings(&[
                "dependabot[bot]",
                "renovate[bot]",
                "github-actions[bot]",
            ]),
            step_timeout_secs: 1800,
        }
    }
}

impl PolicyConfig {
    /// Reject unusable configuration
    ///
    /// # Errors
    /// `PolicyError::Configuration` for a zero timeout, an invalid glob or
    /// an empty command substring.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.step_timeout_secs == 0 {
            return Err(PolicyError::Configuration(
                "step_timeout_secs must be greater than zero".to_string(),
            ));
        }
        let allowed = self.allowed_globs.as_deref().unwrap_or_default();
        for pattern in self
            .sensitive_globs
            .iter()
            .chain(&self.blocked_globs)
            .chain(allowed)
        {
            glob::Pattern::new(pattern).map_err(|e| {
                PolicyError::Configuration(format!("invalid glob {pattern:?}: {e}"))
            })?;
        }
        if self.dangerous_commands.iter().any(|c| c.trim().is_empty()) {
            return Err(PolicyError::Configuration(
                "dangerous_commands entries must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
