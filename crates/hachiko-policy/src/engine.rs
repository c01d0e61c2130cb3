//! Policy engine
//!
//! One engine is constructed per process and shared by handle
//! (`Arc<PolicyEngine>`). The rule list is the only shared mutable state;
//! it changes through explicit management calls and is held read-locked for
//! the duration of an evaluation pass.

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::builtin::builtin_rules;
use crate::config::PolicyConfig;
use crate::context::PolicyContext;
use crate::error::{PolicyError, RuleError};
use crate::rule::{PolicyEvaluationResult, PolicyRule};

#[derive(Debug, Default)]
struct RuleSet {
    rules: IndexMap<String, PolicyRule>,
    initialized: bool,
}

/// Rule-based authorization gate
#[derive(Debug)]
pub struct PolicyEngine {
    config: PolicyConfig,
    state: RwLock<RuleSet>,
}

/// Context the engine allowed
///
/// Only [`PolicyEngine::authorize`] constructs one, so holding it proves
/// the context passed the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizedContext {
    context: PolicyContext,
    result: PolicyEvaluationResult,
}

impl AuthorizedContext {
    /// Authorized context
    #[inline]
    #[must_use]
    pub fn context(&self) -> &PolicyContext {
        &self.context
    }

    /// Evaluation that allowed it (warnings included)
    #[inline]
    #[must_use]
    pub fn result(&self) -> &PolicyEvaluationResult {
        &self.result
    }

    /// Unwrap the context
    #[inline]
    #[must_use]
    pub fn into_context(self) -> PolicyContext {
        self.context
    }
}

impl PolicyEngine {
    /// Create new engine; call [`initialize`](Self::initialize) before evaluating
    #[must_use]
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            state: RwLock::new(RuleSet::default()),
        }
    }

    /// Configuration the built-ins were derived from
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Validate configuration and seed built-in rules; idempotent
    ///
    /// Rules added before initialization keep precedence over built-ins
    /// with the same id.
    ///
    /// # Errors
    /// `PolicyError::Configuration` if the configuration is invalid.
    pub fn initialize(&self) -> Result<(), PolicyError> {
        let mut state = self.state.write();
        if state.initialized {
            return Ok(());
        }
        self.config.validate()?;
        let builtins = builtin_rules(&self.config);
        let count = builtins.len();
        for rule in builtins {
            state.rules.entry(rule.id.clone()).or_insert(rule);
        }
        state.initialized = true;
        tracing::info!(
            "Policy engine initialized with {} built-in rules (network mode {})",
            count,
            self.config.network_mode
        );
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has run
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// Add a rule, replacing any rule with the same id in place
    pub fn add_rule(&self, rule: PolicyRule) {
        let id = rule.id.clone();
        let mut state = self.state.write();
        if state.rules.insert(id.clone(), rule).is_some() {
            tracing::debug!("Replaced policy rule {}", id);
        }
    }

    /// Remove a rule
    pub fn remove_rule(&self, id: &str) -> Option<PolicyRule> {
        self.state.write().rules.shift_remove(id)
    }

    /// Enable a rule; `false` if no such rule
    pub fn enable_rule(&self, id: &str) -> bool {
        self.set_enabled(id, true)
    }

    /// Disable a rule; `false` if no such rule
    pub fn disable_rule(&self, id: &str) -> bool {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        match self.state.write().rules.get_mut(id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Snapshot of all rules, in insertion order
    #[must_use]
    pub fn rules(&self) -> Vec<PolicyRule> {
        self.state.read().rules.values().cloned().collect()
    }

    /// Rule by id
    #[must_use]
    pub fn rule(&self, id: &str) -> Option<PolicyRule> {
        self.state.read().rules.get(id).cloned()
    }

    /// Evaluate every enabled rule against `ctx`
    ///
    /// A rule whose field cannot be resolved does not fire. A rule that
    /// fails to evaluate is logged and skipped; it never aborts the pass.
    ///
    /// # Errors
    /// `PolicyError::Configuration` before initialization.
    pub fn evaluate(&self, ctx: &PolicyContext) -> Result<PolicyEvaluationResult, PolicyError> {
        let state = self.state.read();
        if !state.initialized {
            return Err(PolicyError::Configuration(
                "policy engine is not initialized".to_string(),
            ));
        }

        let mut result = PolicyEvaluationResult {
            allowed: true,
            ..PolicyEvaluationResult::default()
        };
        for rule in state.rules.values().filter(|r| r.enabled) {
            match fires(rule, ctx) {
                Ok(false) => {}
                Ok(true) => {
                    tracing::debug!("Policy rule {} fired ({})", rule.id, rule.severity);
                    if rule.severity.is_blocking() {
                        result.allowed = false;
                        result.violations.push(rule.violation());
                    } else {
                        result.warnings.push(rule.violation());
                    }
                    if rule.requires_approval() {
                        result.requires_approval = true;
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping malformed policy rule {}: {}", rule.id, e);
                }
            }
        }

        if !result.allowed {
            tracing::info!(
                "Blocked action in {} by {}: {} violation(s)",
                ctx.repository,
                ctx.user,
                result.violations.len()
            );
        }
        Ok(result)
    }

    /// Evaluate and, when allowed without approval, vouch for the context
    ///
    /// # Errors
    /// - `PolicyError::Configuration` before initialization
    /// - `PolicyError::Violation` with every blocking violation
    /// - `PolicyError::ApprovalRequired` when a fired rule demands approval
    pub fn authorize(&self, ctx: PolicyContext) -> Result<AuthorizedContext, PolicyError> {
        let result = self.evaluate(&ctx)?;
        if !result.allowed {
            return Err(PolicyError::Violation {
                violations: result.violations,
            });
        }
        if result.requires_approval {
            let rules = self
                .state
                .read()
                .rules
                .values()
                .filter(|r| r.enabled && r.requires_approval())
                .filter(|r| fires(r, &ctx).unwrap_or(false))
                .map(|r| r.id.clone())
                .collect();
            return Err(PolicyError::ApprovalRequired { rules });
        }
        Ok(AuthorizedContext {
            context: ctx,
            result,
        })
    }
}

/// All conditions hold; an unresolvable field means the rule does not fire
fn fires(rule: &PolicyRule, ctx: &PolicyContext) -> Result<bool, RuleError> {
    if rule.conditions.is_empty() {
        return Err(RuleError::NoConditions);
    }
    for condition in &rule.conditions {
        match condition.evaluate(ctx)? {
            Some(true) => {}
            Some(false) => return Ok(false),
            None => {
                tracing::debug!(
                    "Policy rule {} skipped: {} not present in context",
                    rule.id,
                    condition.field
                );
                return Ok(false);
            }
        }
    }
    Ok(true)
}
