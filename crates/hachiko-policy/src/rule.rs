//! Rule and evaluation result types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::condition::Condition;

/// Rule severity; `error` and `critical` block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational
    Info,
    /// Worth a look
    Warning,
    /// Blocks the action
    Error,
    /// Blocks the action
    Critical,
}

impl Severity {
    /// Firing blocks the action
    #[inline]
    #[must_use]
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        })
    }
}

/// What a rule guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRuleType {
    /// Files read or written
    FileAccess,
    /// Shell commands
    CommandExecution,
    /// Outbound network
    NetworkAccess,
    /// CPU, memory, time
    ResourceUsage,
    /// Actor identity
    UserPermission,
    /// Anything else
    Custom,
}

/// Side effect requested when a rule fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    /// Record as a violation or warning according to severity
    Block,
    /// Record as a warning
    Warn,
    /// Only log
    Log,
    /// A human must approve before dispatch
    RequireApproval,
}

/// Authorization rule; fires when all conditions hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Unique id
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Message used for violations
    #[serde(default)]
    pub description: String,
    /// Guarded concern
    #[serde(rename = "type")]
    pub rule_type: PolicyRuleType,
    /// Severity when fired
    pub severity: Severity,
    /// Disabled rules are never evaluated
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// All must hold for the rule to fire
    pub conditions: Vec<Condition>,
    /// Requested side effects
    #[serde(default)]
    pub actions: Vec<PolicyAction>,
}

fn enabled_by_default() -> bool {
    true
}

impl PolicyRule {
    /// Create new enabled rule without conditions
    #[must_use]
    pub fn new(id: impl Into<String>, rule_type: PolicyRuleType, severity: Severity) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            rule_type,
            severity,
            enabled: true,
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// With name
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// With condition
    #[inline]
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// With action
    #[inline]
    #[must_use]
    pub fn with_action(mut self, action: PolicyAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Disabled
    #[inline]
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Firing requests approval
    #[inline]
    #[must_use]
    pub fn requires_approval(&self) -> bool {
        self.actions.contains(&PolicyAction::RequireApproval)
    }

    /// Violation record for this rule
    #[must_use]
    pub fn violation(&self) -> PolicyViolation {
        let message = if self.description.is_empty() {
            format!("rule {} fired", self.id)
        } else {
            self.description.clone()
        };
        PolicyViolation {
            rule_id: self.id.clone(),
            rule_type: self.rule_type,
            severity: self.severity,
            message,
        }
    }
}

/// Fired rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyViolation {
    /// Rule id
    pub rule_id: String,
    /// Rule type
    pub rule_type: PolicyRuleType,
    /// Rule severity
    pub severity: Severity,
    /// Human-readable reason
    pub message: String,
}

/// Outcome of one evaluation pass
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEvaluationResult {
    /// No blocking rule fired
    pub allowed: bool,
    /// Fired `error`/`critical` rules
    pub violations: Vec<PolicyViolation>,
    /// Fired `info`/`warning` rules
    pub warnings: Vec<PolicyViolation>,
    /// Some fired rule asked for approval
    pub requires_approval: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Operator, PolicyField};

    #[test]
    fn rule_from_yaml() {
        let rule: PolicyRule = serde_yaml::from_str(
            r#"
id: no-lockfile-edits
type: file_access
severity: warning
conditions:
  - field: files
    operator: matches
    value: ["package-lock.json", "yarn.lock"]
actions: [warn, require_approval]
"#,
        )
        .unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.rule_type, PolicyRuleType::FileAccess);
        assert!(rule.requires_approval());
        assert_eq!(rule.conditions[0].field, PolicyField::Files);
    }

    #[test]
    fn unknown_field_rejected() {
        let res = serde_yaml::from_str::<PolicyRule>(
            r#"
id: bad
type: custom
severity: info
conditions:
  - field: resource_usage.disk
    operator: greater_than
    value: 1
"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn violation_message_defaults_to_id() {
        let rule = PolicyRule::new("r1", PolicyRuleType::Custom, Severity::Error).with_condition(
            Condition::new(PolicyField::User, Operator::Contains("x".to_string())),
        );
        assert_eq!(rule.violation().message, "rule r1 fired");
        assert!(Severity::Critical.is_blocking());
        assert!(!Severity::Warning.is_blocking());
    }
}
