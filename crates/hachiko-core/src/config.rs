//! Process configuration
//!
//! Loaded once at start-up from TOML or YAML (chosen by file extension).
//!
//! The step timeout is shared by the orchestrator and the policy engine:
//! setting it in either section sets both, and setting both to different
//! values is rejected.
//!
//! ```toml
//! [orchestrator]
//! max_concurrent_migrations = 2
//! step_timeout_secs = 900
//!
//! [policy]
//! network_mode = "none"
//! allowed_globs = ["src/**", "docs/**"]
//!
//! [[rules]]
//! id = "no-lockfile-edits"
//! type = "file_access"
//! severity = "warning"
//! actions = ["require_approval"]
//!
//! [[rules.conditions]]
//! field = "files"
//! operator = "matches"
//! value = ["package-lock.json"]
//! ```

use hachiko_policy::{PolicyConfig, PolicyEngine, PolicyRule};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or shape error
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// YAML syntax or shape error
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Extension is neither `.toml`, `.yaml` nor `.yml`
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// Values parse but are unusable
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Machine-readable error code
    #[inline]
    #[must_use]
    pub fn code(&self) -> &'static str {
        "CONFIGURATION_ERROR"
    }

    /// Structured details payload
    #[must_use]
    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::Io { path, source } => serde_json::json!({
                "path": path.display().to_string(),
                "cause": source.to_string(),
            }),
            other => serde_json::json!({ "message": other.to_string() }),
        }
    }
}

/// Limits enforced by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Migrations allowed in `running` at once per repository
    pub max_concurrent_migrations: usize,
    /// Attempts per step, first run included
    pub max_attempts_per_step: u32,
    /// Wall-clock budget for one agent run
    pub step_timeout_secs: u64,
    /// Delay between agent status polls
    pub poll_interval_secs: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_migrations: 1,
            max_attempts_per_step: 3,
            step_timeout_secs: 1800,
            poll_interval_secs: 10,
        }
    }
}

impl OrchestratorSettings {
    /// Step timeout as a duration
    #[inline]
    #[must_use]
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    /// Poll interval as a duration
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// With max attempts per step
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts_per_step = attempts;
        self
    }

    /// With step timeout
    #[inline]
    #[must_use]
    pub fn with_step_timeout_secs(mut self, secs: u64) -> Self {
        self.step_timeout_secs = secs;
        self
    }

    /// With max concurrent migrations
    #[inline]
    #[must_use]
    pub fn with_max_concurrent_migrations(mut self, max: usize) -> Self {
        self.max_concurrent_migrations = max;
        self
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HachikoConfig {
    /// Policy engine configuration
    pub policy: PolicyConfig,
    /// Orchestrator limits
    pub orchestrator: OrchestratorSettings,
    /// Custom policy rules, kept raw until [`policy_rules`](Self::policy_rules)
    pub rules: Vec<serde_json::Value>,
}

/// Which sections set `step_timeout_secs` explicitly
#[derive(Debug, Clone, Copy, Default)]
struct TimeoutKeys {
    policy: bool,
    orchestrator: bool,
}

impl HachikoConfig {
    /// Load and validate a configuration file
    ///
    /// # Errors
    /// I/O, parse, unsupported-extension or validation errors.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let config = match ext.as_str() {
            "toml" => Self::from_toml_str(&text)?,
            "yaml" | "yml" => Self::from_yaml_str(&text)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };
        config.validate()?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse TOML without validating
    ///
    /// A step timeout given in only one section is copied to the other.
    ///
    /// # Errors
    /// `ConfigError::Toml` on malformed input.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = text.parse()?;
        let has = |section: &str| {
            table
                .get(section)
                .and_then(|s| s.get("step_timeout_secs"))
                .is_some()
        };
        let keys = TimeoutKeys {
            policy: has("policy"),
            orchestrator: has("orchestrator"),
        };
        let mut config: Self = toml::Value::Table(table).try_into()?;
        config.link_step_timeouts(keys);
        Ok(config)
    }

    /// Parse YAML without validating
    ///
    /// A step timeout given in only one section is copied to the other.
    ///
    /// # Errors
    /// `ConfigError::Yaml` on malformed input.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let value: serde_yaml::Value = serde_yaml::from_str(text)?;
        let has = |section: &str| {
            value
                .get(section)
                .and_then(|s| s.get("step_timeout_secs"))
                .is_some()
        };
        let keys = TimeoutKeys {
            policy: has("policy"),
            orchestrator: has("orchestrator"),
        };
        let mut config: Self = serde_yaml::from_value(value)?;
        config.link_step_timeouts(keys);
        Ok(config)
    }

    fn link_step_timeouts(&mut self, keys: TimeoutKeys) {
        match (keys.policy, keys.orchestrator) {
            (true, false) => self.orchestrator.step_timeout_secs = self.policy.step_timeout_secs,
            (false, true) => self.policy.step_timeout_secs = self.orchestrator.step_timeout_secs,
            _ => {}
        }
    }

    /// With one step timeout for both the orchestrator and the policy engine
    #[inline]
    #[must_use]
    pub fn with_step_timeout_secs(mut self, secs: u64) -> Self {
        self.orchestrator.step_timeout_secs = secs;
        self.policy.step_timeout_secs = secs;
        self
    }

    /// Custom rules that parse; malformed entries are logged and skipped
    #[must_use]
    pub fn policy_rules(&self) -> Vec<PolicyRule> {
        self.rules
            .iter()
            .enumerate()
            .filter_map(|(index, raw)| {
                match serde_json::from_value::<PolicyRule>(raw.clone()) {
                    Ok(rule) => Some(rule),
                    Err(e) => {
                        let id = raw.get("id").and_then(|v| v.as_str()).unwrap_or("<no id>");
                        tracing::warn!("Skipping malformed policy rule #{} ({}): {}", index, id, e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Initialized policy engine with built-ins plus custom rules
    ///
    /// Custom rules replace built-ins that share their id.
    ///
    /// # Errors
    /// `ConfigError::Invalid` when the policy configuration is rejected.
    pub fn build_policy_engine(&self) -> Result<PolicyEngine, ConfigError> {
        let engine = PolicyEngine::new(self.policy.clone());
        engine
            .initialize()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let rules = self.policy_rules();
        let count = rules.len();
        for rule in rules {
            engine.add_rule(rule);
        }
        if count > 0 {
            tracing::info!("Loaded {} custom policy rules", count);
        }
        Ok(engine)
    }

    /// Reject zero limits, diverging step timeouts and invalid policy globs
    ///
    /// # Errors
    /// `ConfigError::Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let o = &self.orchestrator;
        if o.max_concurrent_migrations == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.max_concurrent_migrations must be greater than zero".to_string(),
            ));
        }
        if o.max_attempts_per_step == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.max_attempts_per_step must be greater than zero".to_string(),
            ));
        }
        if o.step_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.step_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if o.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if o.step_timeout_secs != self.policy.step_timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "policy.step_timeout_secs ({}) differs from orchestrator.step_timeout_secs ({})",
                self.policy.step_timeout_secs, o.step_timeout_secs
            )));
        }
        self.policy
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hachiko_policy::NetworkMode;

    #[test]
    fn defaults() {
        let config = HachikoConfig::default();
        assert_eq!(config.orchestrator.max_concurrent_migrations, 1);
        assert_eq!(config.orchestrator.max_attempts_per_step, 3);
        assert_eq!(config.orchestrator.step_timeout(), Duration::from_secs(1800));
        assert_eq!(config.orchestrator.poll_interval(), Duration::from_secs(10));
        config.validate().unwrap();
    }

    #[test]
    fn toml_partial() {
        let config = HachikoConfig::from_toml_str(
            "[orchestrator]\nmax_attempts_per_step = 5\n\n[policy]\nnetwork_mode = \"none\"\n",
        )
        .unwrap();
        assert_eq!(config.orchestrator.max_attempts_per_step, 5);
        assert_eq!(config.orchestrator.step_timeout_secs, 1800);
        assert_eq!(config.policy.network_mode, NetworkMode::None);
    }

    #[test]
    fn yaml_and_validation() {
        let config =
            HachikoConfig::from_yaml_str("orchestrator:\n  max_attempts_per_step: 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_attempts_per_step"));
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn from_path_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("hachiko.yml");
        std::fs::write(&yaml, "policy:\n  step_timeout_secs: 60\n").unwrap();
        let loaded = HachikoConfig::from_path(&yaml).unwrap();
        assert_eq!(loaded.policy.step_timeout_secs, 60);
        assert_eq!(loaded.orchestrator.step_timeout(), Duration::from_secs(60));

        let ini = dir.path().join("hachiko.ini");
        std::fs::write(&ini, "x=1").unwrap();
        assert!(matches!(
            HachikoConfig::from_path(&ini),
            Err(ConfigError::UnsupportedFormat(_))
        ));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            HachikoConfig::from_path(&missing),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn step_timeout_is_shared() {
        let config =
            HachikoConfig::from_toml_str("[orchestrator]\nstep_timeout_secs = 900\n").unwrap();
        assert_eq!(config.policy.step_timeout_secs, 900);
        config.validate().unwrap();

        let config = HachikoConfig::from_toml_str(
            "[orchestrator]\nstep_timeout_secs = 900\n\n[policy]\nstep_timeout_secs = 60\n",
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("step_timeout_secs"));

        let built = HachikoConfig::default().with_step_timeout_secs(120);
        assert_eq!(built.policy.step_timeout_secs, 120);
        built.validate().unwrap();
    }

    #[test]
    fn custom_rules_skip_malformed_entries() {
        let config = HachikoConfig::from_yaml_str(
            r#"
rules:
  - id: no-lockfile-edits
    type: file_access
    severity: warning
    conditions:
      - field: files
        operator: matches
        value: ["package-lock.json"]
    actions: [require_approval]
  - id: broken
    type: custom
    conditions: []
"#,
        )
        .unwrap();
        let rules = config.policy_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "no-lockfile-edits");

        let engine = config.build_policy_engine().unwrap();
        assert!(engine.rule("no-lockfile-edits").is_some());
        assert!(engine.rule("broken").is_none());
    }

    #[test]
    fn custom_rules_from_toml() {
        let config = HachikoConfig::from_toml_str(
            r#"
[[rules]]
id = "frozen-repo"
type = "custom"
severity = "critical"

[[rules.conditions]]
field = "repository"
operator = "contains"
value = "mainframe"

[[rules]]
id = "no-severity"
type = "custom"
conditions = []
"#,
        )
        .unwrap();
        let ids: Vec<_> = config.policy_rules().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["frozen-repo".to_string()]);
    }
}
