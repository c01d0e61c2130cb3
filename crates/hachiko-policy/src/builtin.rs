//! Built-in rules seeded from [`PolicyConfig`]

use crate::condition::{Condition, Operator, PolicyField};
use crate::config::{NetworkMode, PolicyConfig};
use crate::rule::{PolicyAction, PolicyRule, PolicyRuleType, Severity};

/// Id of the sensitive-file rule
pub const SENSITIVE_FILES: &str = "builtin-sensitive-files";
/// Id of the risky-path rule
pub const BLOCKED_PATHS: &str = "builtin-blocked-paths";
/// Id of the dangerous-command rule
pub const DANGEROUS_COMMANDS: &str = "builtin-dangerous-commands";
/// Id of the network-command rule (network mode `none`)
pub const NETWORK_COMMANDS: &str = "builtin-no-network-commands";
/// Id of the network-request rule (network mode `none`)
pub const NETWORK_REQUESTS: &str = "builtin-no-network-requests";
/// Id of the path allowlist rule
pub const ALLOWED_PATHS: &str = "builtin-allowed-paths";
/// Id of the bot-account rule
pub const BOT_ACCOUNTS: &str = "builtin-bot-accounts";
/// Id of the step-timeout rule
pub const STEP_TIMEOUT: &str = "builtin-step-timeout";

/// Commands that reach the network
const NETWORK_TOOLS: &[&str] = &[
    "curl", "wget", "ssh", "scp", "rsync", "nc", "telnet", "ftp",
];

/// Rules derived from configuration, in evaluation order
#[must_use]
pub fn builtin_rules(config: &PolicyConfig) -> Vec<PolicyRule> {
    let mut rules = Vec::new();

    if !config.sensitive_globs.is_empty() {
        rules.push(
            PolicyRule::new(SENSITIVE_FILES, PolicyRuleType::FileAccess, Severity::Critical)
                .with_name("Sensitive files")
                .with_description("access to sensitive or secret files is blocked")
                .with_condition(Condition::new(
                    PolicyField::Files,
                    Operator::Matches(config.sensitive_globs.clone()),
                ))
                .with_action(PolicyAction::Block),
        );
    }

    if !config.blocked_globs.is_empty() {
        rules.push(
            PolicyRule::new(BLOCKED_PATHS, PolicyRuleType::FileAccess, Severity::Error)
                .with_name("Blocked paths")
                .with_description("modifying this path is blocked")
                .with_condition(Condition::new(
                    PolicyField::Files,
                    Operator::Matches(config.blocked_globs.clone()),
                ))
                .with_action(PolicyAction::Block),
        );
    }

    if !config.dangerous_commands.is_empty() {
        let patterns = config
            .dangerous_commands
            .iter()
            .map(|c| format!("*{}*", glob::Pattern::escape(c)))
            .collect();
        rules.push(
            PolicyRule::new(
                DANGEROUS_COMMANDS,
                PolicyRuleType::CommandExecution,
                Severity::Critical,
            )
            .with_name("Dangerous commands")
            .with_description("dangerous shell command is blocked")
            .with_condition(Condition::new(PolicyField::Commands, Operator::Matches(patterns)))
            .with_action(PolicyAction::Block),
        );
    }

    if config.network_mode == NetworkMode::None {
        let patterns = NETWORK_TOOLS
            .iter()
            .flat_map(|tool| [format!("{tool} *"), format!("* {tool} *")])
            .collect();
        rules.push(
            PolicyRule::new(NETWORK_COMMANDS, PolicyRuleType::NetworkAccess, Severity::Error)
                .with_name("No network commands")
                .with_description("network access is disabled")
                .with_condition(Condition::new(PolicyField::Commands, Operator::Matches(patterns)))
                .with_action(PolicyAction::Block),
        );
        rules.push(
            PolicyRule::new(NETWORK_REQUESTS, PolicyRuleType::NetworkAccess, Severity::Error)
                .with_name("No network requests")
                .with_description("network access is disabled")
                .with_condition(Condition::new(
                    PolicyField::NetworkRequests,
                    Operator::GreaterThan(0.0),
                ))
                .with_action(PolicyAction::Block),
        );
    }

    if let Some(allowed) = config.allowed_globs.as_ref().filter(|g| !g.is_empty()) {
        rules.push(
            PolicyRule::new(ALLOWED_PATHS, PolicyRuleType::FileAccess, Severity::Error)
                .with_name("Allowed paths")
                .with_description("file is outside the allowed paths")
                .with_condition(Condition::new(
                    PolicyField::Files,
                    Operator::NotMatches(allowed.clone()),
                ))
                .with_action(PolicyAction::Block),
        );
    }

    if !config.bot_accounts.is_empty() {
        let patterns = config
            .bot_accounts
            .iter()
            .map(|account| glob::Pattern::escape(account))
            .collect();
        rules.push(
            PolicyRule::new(BOT_ACCOUNTS, PolicyRuleType::UserPermission, Severity::Warning)
                .with_name("Bot accounts")
                .with_description("action requested by a bot or service account")
                .with_condition(Condition::new(PolicyField::User, Operator::Matches(patterns)))
                .with_action(PolicyAction::Warn),
        );
    }

    #[allow(clippy::cast_precision_loss)]
    let timeout = config.step_timeout_secs as f64;
    rules.push(
        PolicyRule::new(STEP_TIMEOUT, PolicyRuleType::ResourceUsage, Severity::Warning)
            .with_name("Step timeout")
            .with_description(format!(
                "execution exceeded the step timeout of {}s",
                config.step_timeout_secs
            ))
            .with_condition(Condition::new(
                PolicyField::ExecutionTimeSecs,
                Operator::GreaterThan(timeout),
            ))
            .with_action(PolicyAction::Warn),
    );

    rules
}
