//! Convention validation for migration pull requests
//!
//! A pull request is classified as a migration PR when at least two of the
//! three conventions hold: branch naming, the migration label, and a title
//! carrying a tracking token or bracketed id. Missing conventions are
//! reported as remediation hints in a fixed order (branch, label, title).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::conventions::{bracketed_id, leading_token, parse_branch, MIGRATION_LABEL};
use crate::types::PrSignal;

/// Minimum number of conventions for a valid classification
pub const REQUIRED_CONVENTIONS: u8 = 2;

/// A naming convention that a pull request does not follow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationHint {
    /// Head branch should be `hachiko/{id}` or `hachiko/{id}-step-{n}`
    Branch,
    /// PR should carry the `hachiko:migration` label
    Label,
    /// Title should lead with a tracking token or contain `[{id}]`
    Title,
}

impl RemediationHint {
    /// Human-readable remediation message
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Branch => {
                "Use a branch named 'hachiko/{migration-id}' or 'hachiko/{migration-id}-step-{n}'"
            }
            Self::Label => "Add the 'hachiko:migration' label",
            Self::Title => {
                "Start the title with 'hachiko-track:{migration-id}:{step}' or include '[{migration-id}]'"
            }
        }
    }
}

impl fmt::Display for RemediationHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of convention validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// At least [`REQUIRED_CONVENTIONS`] conventions hold
    pub valid: bool,
    /// Number of conventions that hold
    pub satisfied: u8,
    /// Missing conventions, in branch/label/title order; empty when valid
    pub hints: Vec<RemediationHint>,
}

/// Count independently-held conventions and report what is missing
#[must_use]
pub fn validate_hachiko_pr(pr: &PrSignal) -> ValidationReport {
    let checks = [
        (RemediationHint::Branch, parse_branch(&pr.head_branch).is_some()),
        (RemediationHint::Label, pr.has_label(MIGRATION_LABEL)),
        (
            RemediationHint::Title,
            leading_token(&pr.title).is_some() || bracketed_id(&pr.title).is_some(),
        ),
    ];

    let satisfied = checks.iter().filter(|(_, held)| *held).count() as u8;
    let valid = satisfied >= REQUIRED_CONVENTIONS;
    let hints = if valid {
        Vec::new()
    } else {
        checks
            .iter()
            .filter(|(_, held)| !*held)
            .map(|(hint, _)| *hint)
            .collect()
    };

    ValidationReport {
        valid,
        satisfied,
        hints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_conventions_are_enough() {
        let pr = PrSignal::new(1, "whatever", "hachiko/m1").with_label(MIGRATION_LABEL);
        let report = validate_hachiko_pr(&pr);
        assert!(report.valid);
        assert_eq!(report.satisfied, 2);
        assert!(report.hints.is_empty());
    }

    #[test]
    fn one_convention_lists_missing_in_order() {
        let pr = PrSignal::new(1, "[m1] thing", "feature/x");
        let report = validate_hachiko_pr(&pr);
        assert!(!report.valid);
        assert_eq!(report.satisfied, 1);
        assert_eq!(report.hints, vec![RemediationHint::Branch, RemediationHint::Label]);
    }

    #[test]
    fn nothing_held_lists_all_three() {
        let pr = PrSignal::new(1, "plain", "feature/x");
        let report = validate_hachiko_pr(&pr);
        assert_eq!(report.satisfied, 0);
        assert_eq!(
            report.hints,
            vec![
                RemediationHint::Branch,
                RemediationHint::Label,
                RemediationHint::Title
            ]
        );
    }

    #[test]
    fn hint_messages_name_the_convention() {
        assert!(RemediationHint::Label.to_string().contains("hachiko:migration"));
        assert!(RemediationHint::Branch.message().starts_with("Use a branch"));
    }
}
