use hachiko_policy::builtin::{ALLOWED_PATHS, DANGEROUS_COMMANDS, NETWORK_COMMANDS};
use hachiko_policy::{
    Condition, NetworkMode, Operator, PolicyConfig, PolicyContext, PolicyEngine, PolicyError,
    PolicyField, PolicyRule, PolicyRuleType, ResourceUsage, Severity,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn engine_with(config: PolicyConfig) -> PolicyEngine {
    let engine = PolicyEngine::new(config);
    engine.initialize().unwrap();
    engine
}

#[test]
fn test_sensitive_env_file_blocked() {
    let engine = engine_with(PolicyConfig::default());
    let ctx = PolicyContext::new("acme/web", "migration-bot").with_files([".env.production"]);

    let result = engine.evaluate(&ctx).unwrap();
    assert!(!result.allowed);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].rule_type, PolicyRuleType::FileAccess);
}

#[test]
fn test_plain_command_allowed() {
    let engine = engine_with(PolicyConfig::default());
    let ctx = PolicyContext::new("acme/web", "migration-bot").with_commands(["npm test"]);

    let result = engine.evaluate(&ctx).unwrap();
    assert!(result.allowed);
    assert!(result.violations.is_empty());
}

#[test]
fn test_dangerous_command_blocked() {
    let engine = engine_with(PolicyConfig::default());
    let ctx = PolicyContext::new("acme/web", "migration-bot")
        .with_commands(["npm test", "sudo rm -rf /var/lib"]);

    let err = engine.authorize(ctx).unwrap_err();
    match err {
        PolicyError::Violation { violations } => {
            let ids: Vec<_> = violations.iter().map(|v| v.rule_id.as_str()).collect();
            assert_eq!(ids, vec![DANGEROUS_COMMANDS]);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_network_none_blocks_curl() {
    let engine = engine_with(PolicyConfig {
        network_mode: NetworkMode::None,
        ..PolicyConfig::default()
    });
    let ctx = PolicyContext::new("acme/web", "migration-bot")
        .with_commands(["curl https://example.com/install.sh"]);
    let result = engine.evaluate(&ctx).unwrap();
    assert!(!result.allowed);
    assert_eq!(result.violations[0].rule_id, NETWORK_COMMANDS);

    let offline = PolicyContext::new("acme/web", "migration-bot").with_resource_usage(
        ResourceUsage {
            network_requests: 3.0,
            ..ResourceUsage::default()
        },
    );
    assert!(!engine.evaluate(&offline).unwrap().allowed);
}

#[test]
fn test_allowlist() {
    let engine = engine_with(PolicyConfig {
        allowed_globs: Some(vec!["src/**".to_string(), "docs/*.md".to_string()]),
        ..PolicyConfig::default()
    });
    let inside = PolicyContext::new("acme/web", "alice").with_files(["src/a/b.ts", "docs/x.md"]);
    assert!(engine.evaluate(&inside).unwrap().allowed);

    let outside = PolicyContext::new("acme/web", "alice").with_files(["src/a.ts", "Makefile"]);
    let result = engine.evaluate(&outside).unwrap();
    assert!(!result.allowed);
    assert_eq!(result.violations[0].rule_id, ALLOWED_PATHS);
}

#[test]
fn test_allowlist_does_not_admit_nested_basenames() {
    let engine = engine_with(PolicyConfig {
        allowed_globs: Some(vec!["src/**".to_string(), "README.md".to_string()]),
        ..PolicyConfig::default()
    });
    let nested = PolicyContext::new("acme/web", "alice").with_files(["deploy/README.md"]);
    let result = engine.evaluate(&nested).unwrap();
    assert!(!result.allowed);
    assert_eq!(result.violations[0].rule_id, ALLOWED_PATHS);

    let root = PolicyContext::new("acme/web", "alice").with_files(["README.md", "src/lib.rs"]);
    assert!(engine.evaluate(&root).unwrap().allowed);
}

#[test]
fn test_risky_paths_blocked_at_any_depth() {
    let engine = engine_with(PolicyConfig::default());
    for file in [
        ".git/config",
        "packages/app/.git/config",
        ".github/workflows/ci.yml",
        "packages/app/node_modules/left-pad/index.js",
        "third_party/vendor/lib.go",
    ] {
        let ctx = PolicyContext::new("acme/web", "alice").with_files([file]);
        assert!(!engine.evaluate(&ctx).unwrap().allowed, "{file} should be blocked");
    }
    let ctx = PolicyContext::new("acme/web", "alice").with_files(["src/vendors.ts"]);
    assert!(engine.evaluate(&ctx).unwrap().allowed);
}

#[test]
fn test_bot_account_flagged() {
    let engine = engine_with(PolicyConfig::default());
    let ctx = PolicyContext::new("acme/web", "dependabot[bot]");
    let result = engine.evaluate(&ctx).unwrap();
    assert!(result.allowed);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].severity, Severity::Warning);
}

#[test]
fn test_readding_rule_replaces_in_place() {
    let engine = engine_with(PolicyConfig::default());
    let rule = |severity| {
        PolicyRule::new("no-mainframe", PolicyRuleType::Custom, severity).with_condition(
            Condition::new(PolicyField::Repository, Operator::Contains("mainframe".to_string())),
        )
    };
    engine.add_rule(rule(Severity::Info));
    let position = engine.rules().iter().position(|r| r.id == "no-mainframe");
    engine.add_rule(rule(Severity::Critical).with_description("frozen repository"));

    let rules = engine.rules();
    let matching: Vec<_> = rules.iter().filter(|r| r.id == "no-mainframe").collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].severity, Severity::Critical);
    assert_eq!(matching[0].description, "frozen repository");
    assert_eq!(rules.iter().position(|r| r.id == "no-mainframe"), position);
}

fn numeric_field() -> impl Strategy<Value = PolicyField> {
    prop_oneof![
        Just(PolicyField::CpuPercent),
        Just(PolicyField::MemoryMb),
        Just(PolicyField::ExecutionTimeSecs),
        Just(PolicyField::NetworkRequests),
    ]
}

proptest! {
    #[test]
    fn prop_nan_never_fires(
        field in numeric_field(),
        bound in prop_oneof![Just(f64::NAN), any::<f64>()],
        value in prop_oneof![Just(f64::NAN), any::<f64>()],
        less in any::<bool>(),
    ) {
        prop_assume!(bound.is_nan() || value.is_nan());
        let engine = engine_with(PolicyConfig::default());
        let operator = if less { Operator::LessThan(bound) } else { Operator::GreaterThan(bound) };
        engine.add_rule(
            PolicyRule::new("numeric", PolicyRuleType::ResourceUsage, Severity::Critical)
                .with_condition(Condition::new(field, operator)),
        );
        let usage = ResourceUsage {
            cpu_percent: value,
            memory_mb: value,
            execution_time_secs: value,
            network_requests: value,
        };
        let ctx = PolicyContext::new("acme/web", "alice").with_resource_usage(usage);

        let result = engine.evaluate(&ctx).unwrap();
        prop_assert!(result.violations.iter().all(|v| v.rule_id != "numeric"));
    }

    #[test]
    fn prop_repeated_add_keeps_one_rule(severities in proptest::collection::vec(
        prop_oneof![
            Just(Severity::Info),
            Just(Severity::Warning),
            Just(Severity::Error),
            Just(Severity::Critical),
        ],
        1..8,
    )) {
        let engine = engine_with(PolicyConfig::default());
        let base = engine.rules().len();
        for severity in &severities {
            engine.add_rule(
                PolicyRule::new("dup", PolicyRuleType::Custom, *severity).with_condition(
                    Condition::new(PolicyField::User, Operator::Contains("x".to_string())),
                ),
            );
        }
        prop_assert_eq!(engine.rules().len(), base + 1);
        prop_assert_eq!(engine.rule("dup").unwrap().severity, *severities.last().unwrap());
    }
}
