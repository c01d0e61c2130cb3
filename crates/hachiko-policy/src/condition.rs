//! Typed rule conditions
//!
//! On the wire a condition is `{field, operator, value}` with a dotted
//! field path. Deserialization turns it into a [`PolicyField`] and an
//! [`Operator`] carrying operands of the right shape, so unknown paths and
//! ill-typed operands are rejected before a rule ever reaches the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::context::PolicyContext;
use crate::error::RuleError;

/// Context field addressed by a condition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PolicyField {
    /// `repository`
    Repository,
    /// `user`
    User,
    /// `files`
    Files,
    /// `commands`
    Commands,
    /// `resource_usage.cpu_percent`
    CpuPercent,
    /// `resource_usage.memory_mb`
    MemoryMb,
    /// `resource_usage.execution_time_secs`
    ExecutionTimeSecs,
    /// `resource_usage.network_requests`
    NetworkRequests,
    /// `environment.network_mode`
    NetworkMode,
    /// `environment.name`
    EnvironmentName,
    /// `environment.<variable>`
    EnvironmentVariable(String),
}

impl PolicyField {
    /// Dotted path
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Repository => "repository".to_string(),
            Self::User => "user".to_string(),
            Self::Files => "files".to_string(),
            Self::Commands => "commands".to_string(),
            Self::CpuPercent => "resource_usage.cpu_percent".to_string(),
            Self::MemoryMb => "resource_usage.memory_mb".to_string(),
            Self::ExecutionTimeSecs => "resource_usage.execution_time_secs".to_string(),
            Self::NetworkRequests => "resource_usage.network_requests".to_string(),
            Self::NetworkMode => "environment.network_mode".to_string(),
            Self::EnvironmentName => "environment.name".to_string(),
            Self::EnvironmentVariable(name) => format!("environment.{name}"),
        }
    }

    /// Look the field up; `None` when the context does not carry it
    #[must_use]
    pub fn resolve<'a>(&self, ctx: &'a PolicyContext) -> Option<FieldValue<'a>> {
        let usage = |f: fn(&crate::context::ResourceUsage) -> f64| {
            ctx.resource_usage.as_ref().map(|u| FieldValue::Number(f(u)))
        };
        match self {
            Self::Repository => Some(FieldValue::Text(&ctx.repository)),
            Self::User => Some(FieldValue::Text(&ctx.user)),
            Self::Files => Some(FieldValue::List(&ctx.files)),
            Self::Commands => ctx.commands.as_deref().map(FieldValue::List),
            Self::CpuPercent => usage(|u| u.cpu_percent),
            Self::MemoryMb => usage(|u| u.memory_mb),
            Self::ExecutionTimeSecs => usage(|u| u.execution_time_secs),
            Self::NetworkRequests => usage(|u| u.network_requests),
            Self::NetworkMode => Some(FieldValue::Text(ctx.environment.network_mode.as_str())),
            Self::EnvironmentName => Some(FieldValue::Text(&ctx.environment.name)),
            Self::EnvironmentVariable(name) => ctx
                .environment
                .variables
                .get(name)
                .map(|v| FieldValue::Text(v)),
        }
    }
}

impl FromStr for PolicyField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field = match s {
            "repository" => Self::Repository,
            "user" => Self::User,
            "files" => Self::Files,
            "commands" => Self::Commands,
            "resource_usage.cpu_percent" => Self::CpuPercent,
            "resource_usage.memory_mb" => Self::MemoryMb,
            "resource_usage.execution_time_secs" => Self::ExecutionTimeSecs,
            "resource_usage.network_requests" => Self::NetworkRequests,
            "environment.network_mode" => Self::NetworkMode,
            "environment.name" => Self::EnvironmentName,
            other => match other.strip_prefix("environment.") {
                Some(var) if !var.is_empty() && !var.contains('.') => {
                    Self::EnvironmentVariable(var.to_string())
                }
                _ => return Err(format!("unknown field path: {other:?}")),
            },
        };
        Ok(field)
    }
}

impl fmt::Display for PolicyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Value resolved from a context
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    /// Scalar text
    Text(&'a str),
    /// List of strings
    List(&'a [String]),
    /// Number
    Number(f64),
}

impl FieldValue<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Number(_) => "number",
        }
    }
}

/// Operand of `equals` / `not_equals`
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    /// Text
    Text(String),
    /// List of strings, compared element-wise
    List(Vec<String>),
    /// Number
    Number(f64),
}

impl ConditionValue {
    /// Deep equality; values of different kinds are unequal
    fn equals(&self, value: &FieldValue<'_>) -> bool {
        match (self, value) {
            (Self::Text(a), FieldValue::Text(b)) => a.as_str() == *b,
            (Self::List(a), FieldValue::List(b)) => a.as_slice() == *b,
            #[allow(clippy::float_cmp)]
            (Self::Number(a), FieldValue::Number(b)) => a == b,
            _ => false,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(s) => serde_json::Value::from(s.as_str()),
            Self::List(items) => serde_json::Value::from(items.clone()),
            Self::Number(n) => serde_json::Value::from(*n),
        }
    }

    fn from_json(value: serde_json::Value) -> Result<Self, String> {
        match value {
            serde_json::Value::String(s) => Ok(Self::Text(s)),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Self::Number)
                .ok_or_else(|| format!("unrepresentable number {n}")),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => Ok(s),
                    other => Err(format!("list items must be strings, got {other}")),
                })
                .collect::<Result<_, _>>()
                .map(Self::List),
            other => Err(format!("unsupported operand {other}")),
        }
    }
}

/// Condition operator with its operand
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// Deep equality
    Equals(ConditionValue),
    /// Negated deep equality
    NotEquals(ConditionValue),
    /// Some element matches some glob
    Matches(Vec<String>),
    /// Some element matches none of the globs
    NotMatches(Vec<String>),
    /// List membership (substring for text)
    Contains(String),
    /// Negated membership
    NotContains(String),
    /// Numeric `<`
    LessThan(f64),
    /// Numeric `>`
    GreaterThan(f64),
}

impl Operator {
    /// Wire name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Equals(_) => "equals",
            Self::NotEquals(_) => "not_equals",
            Self::Matches(_) => "matches",
            Self::NotMatches(_) => "not_matches",
            Self::Contains(_) => "contains",
            Self::NotContains(_) => "not_contains",
            Self::LessThan(_) => "less_than",
            Self::GreaterThan(_) => "greater_than",
        }
    }

    /// Apply the operator to a resolved value
    ///
    /// # Errors
    /// `RuleError::InvalidPattern` for a bad glob and `RuleError::TypeMismatch`
    /// when the operator cannot apply to the value's kind.
    pub fn evaluate(&self, field: &PolicyField, value: FieldValue<'_>) -> Result<bool, RuleError> {
        let mismatch = || RuleError::TypeMismatch {
            field: field.path(),
            operator: self.name(),
            kind: value.kind(),
        };
        match self {
            Self::Equals(expected) => Ok(expected.equals(&value)),
            Self::NotEquals(expected) => Ok(!expected.equals(&value)),
            Self::Matches(patterns) => {
                let patterns = compile(patterns)?;
                let items = elements(value).ok_or_else(mismatch)?;
                Ok(items.iter().any(|item| matches_any(&patterns, item)))
            }
            Self::NotMatches(patterns) => {
                let patterns = compile(patterns)?;
                let items = elements(value).ok_or_else(mismatch)?;
                Ok(items
                    .iter()
                    .any(|item| !patterns.iter().any(|p| p.matches(item))))
            }
            Self::Contains(needle) => contains(value, needle).ok_or_else(mismatch),
            Self::NotContains(needle) => contains(value, needle)
                .map(|found| !found)
                .ok_or_else(mismatch),
            Self::LessThan(bound) => match value {
                FieldValue::Number(n) => Ok(n < *bound),
                _ => Err(mismatch()),
            },
            Self::GreaterThan(bound) => match value {
                FieldValue::Number(n) => Ok(n > *bound),
                _ => Err(mismatch()),
            },
        }
    }

    fn operand_json(&self) -> serde_json::Value {
        match self {
            Self::Equals(v) | Self::NotEquals(v) => v.to_json(),
            Self::Matches(p) | Self::NotMatches(p) => serde_json::Value::from(p.clone()),
            Self::Contains(s) | Self::NotContains(s) => serde_json::Value::from(s.as_str()),
            Self::LessThan(n) | Self::GreaterThan(n) => serde_json::Value::from(*n),
        }
    }

    fn from_parts(operator: &str, value: serde_json::Value) -> Result<Self, String> {
        let number = |v: serde_json::Value| -> Result<f64, String> {
            v.as_f64()
                .ok_or_else(|| format!("{operator} requires a number, got {v}"))
        };
        let patterns = |v: serde_json::Value| -> Result<Vec<String>, String> {
            match ConditionValue::from_json(v)? {
                ConditionValue::Text(p) => Ok(vec![p]),
                ConditionValue::List(p) => Ok(p),
                ConditionValue::Number(_) => Err(format!("{operator} requires glob patterns")),
            }
        };
        let text = |v: serde_json::Value| -> Result<String, String> {
            match v {
                serde_json::Value::String(s) => Ok(s),
                other => Err(format!("{operator} requires a string, got {other}")),
            }
        };
        match operator {
            "equals" => ConditionValue::from_json(value).map(Self::Equals),
            "not_equals" => ConditionValue::from_json(value).map(Self::NotEquals),
            "matches" => patterns(value).map(Self::Matches),
            "not_matches" => patterns(value).map(Self::NotMatches),
            "contains" => text(value).map(Self::Contains),
            "not_contains" => text(value).map(Self::NotContains),
            "less_than" => number(value).map(Self::LessThan),
            "greater_than" => number(value).map(Self::GreaterThan),
            other => Err(format!("unknown operator: {other:?}")),
        }
    }
}

/// `{field, operator, value}`, all conditions of a rule must hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCondition", into = "RawCondition")]
pub struct Condition {
    /// Addressed field
    pub field: PolicyField,
    /// Operator and operand
    pub operator: Operator,
}

impl Condition {
    /// Create new condition
    #[inline]
    #[must_use]
    pub fn new(field: PolicyField, operator: Operator) -> Self {
        Self { field, operator }
    }

    /// Evaluate against a context; `Ok(None)` when the field is absent
    ///
    /// # Errors
    /// See [`Operator::evaluate`].
    pub fn evaluate(&self, ctx: &PolicyContext) -> Result<Option<bool>, RuleError> {
        match self.field.resolve(ctx) {
            Some(value) => self.operator.evaluate(&self.field, value).map(Some),
            None => Ok(None),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawCondition {
    field: String,
    operator: String,
    value: serde_json::Value,
}

impl TryFrom<RawCondition> for Condition {
    type Error = String;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        Ok(Self {
            field: raw.field.parse()?,
            operator: Operator::from_parts(&raw.operator, raw.value)?,
        })
    }
}

impl From<Condition> for RawCondition {
    fn from(c: Condition) -> Self {
        Self {
            field: c.field.path(),
            operator: c.operator.name().to_string(),
            value: c.operator.operand_json(),
        }
    }
}

fn compile(patterns: &[String]) -> Result<Vec<glob::Pattern>, RuleError> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| RuleError::InvalidPattern {
                pattern: p.clone(),
                reason: e.msg.to_string(),
            })
        })
        .collect()
}

fn elements<'a>(value: FieldValue<'a>) -> Option<Vec<&'a str>> {
    match value {
        FieldValue::Text(s) => Some(vec![s]),
        FieldValue::List(items) => Some(items.iter().map(String::as_str).collect()),
        FieldValue::Number(_) => None,
    }
}

/// Match the full path; patterns without a `/` also match its final component
///
/// Allowlists (`NotMatches`) never take the basename route, so `README.md`
/// admits only the root file.
fn matches_any(patterns: &[glob::Pattern], item: &str) -> bool {
    let base = Path::new(item).file_name().and_then(|n| n.to_str());
    patterns.iter().any(|p| {
        p.matches(item)
            || (!p.as_str().contains('/') && base.is_some_and(|b| b != item && p.matches(b)))
    })
}

fn contains(value: FieldValue<'_>, needle: &str) -> Option<bool> {
    match value {
        FieldValue::Text(s) => Some(s.contains(needle)),
        FieldValue::List(items) => Some(items.iter().any(|i| i == needle)),
        FieldValue::Number(_) => None,
    }
}
