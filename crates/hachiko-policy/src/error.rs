//! Error types for policy evaluation

use crate::rule::PolicyViolation;

/// Policy engine failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum PolicyError {
    /// Bad or missing configuration, or the engine is not initialized
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Action blocked
    #[error("action blocked by {} policy violation(s): {}", violations.len(), rule_ids(violations))]
    Violation {
        /// Every blocking violation, verbatim
        violations: Vec<PolicyViolation>,
    },

    /// Action allowed but a rule demands human approval first
    #[error("approval required by rule(s): {}", rules.join(", "))]
    ApprovalRequired {
        /// Rules that asked for approval
        rules: Vec<String>,
    },
}

impl PolicyError {
    /// Machine-readable error code
    #[inline]
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Violation { .. } => "POLICY_VIOLATION",
            Self::ApprovalRequired { .. } => "APPROVAL_REQUIRED",
        }
    }

    /// Policy errors are never retried as-is
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Approval is a human decision
    #[inline]
    #[must_use]
    pub fn requires_human(&self) -> bool {
        matches!(self, Self::ApprovalRequired { .. })
    }

    /// Structured details payload
    #[must_use]
    pub fn details(&self) -> serde_json::Value {
        match self {
            Self::Configuration(message) => serde_json::json!({ "message": message }),
            Self::Violation { violations } => serde_json::json!({
                "violations": violations,
            }),
            Self::ApprovalRequired { rules } => serde_json::json!({ "rules": rules }),
        }
    }
}

fn rule_ids(violations: &[PolicyViolation]) -> String {
    violations
        .iter()
        .map(|v| v.rule_id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Evaluation failure confined to a single rule
///
/// Never escapes [`crate::PolicyEngine::evaluate`]; the rule is skipped and
/// the failure logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    /// Rule has nothing to evaluate
    #[error("rule has no conditions")]
    NoConditions,

    /// Glob failed to compile
    #[error("invalid glob {pattern:?}: {reason}")]
    InvalidPattern {
        /// Offending pattern
        pattern: String,
        /// Parser message
        reason: String,
    },

    /// Operator not applicable to the field's value
    #[error("operator {operator} cannot apply to {kind} field {field}")]
    TypeMismatch {
        /// Field path
        field: String,
        /// Operator name
        operator: &'static str,
        /// Kind of the resolved value
        kind: &'static str,
    },
}
