//! Naming conventions shared by producers and the extractor
//!
//! ```text
//! branch          hachiko/{id}            hachiko/{id}-step-{n}   hachiko/{id}-cleanup
//! legacy branch   hachi/{id}/step-{n}
//! tracking token  hachiko-track:{id}:{n|cleanup}
//! ```
//!
//! A tracking token only counts inside an HTML comment in the PR body or as
//! the leading text of the PR title.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::SignalError;
use crate::types::StepRef;

/// Label applied to every migration pull request
pub const MIGRATION_LABEL: &str = "hachiko:migration";

/// Branch prefix for current-style migration branches
pub const BRANCH_PREFIX: &str = "hachiko/";

/// Branch prefix for legacy migration branches
pub const LEGACY_BRANCH_PREFIX: &str = "hachi/";

/// Literal prefix of a tracking token
pub const TRACKING_PREFIX: &str = "hachiko-track:";

const ID: &str = r"[A-Za-z0-9][A-Za-z0-9._-]*";

pub(crate) static BRANCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^hachiko/({ID})$")).expect("static regex"));

pub(crate) static BRANCH_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<id>.+?)-(?:step-(?P<step>[A-Za-z0-9]+)|(?P<cleanup>cleanup))$")
        .expect("static regex")
});

pub(crate) static LEGACY_BRANCH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^hachi/({ID})(?:/(?P<rest>.*))?$")).expect("static regex")
});

pub(crate) static TRACKING_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"hachiko-track:(?P<id>{ID}):(?P<step>[A-Za-z0-9]+)")).expect("static regex")
});

pub(crate) static LEADING_TRACKING_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^\s*hachiko-track:(?P<id>{ID}):(?P<step>[A-Za-z0-9]+)"))
        .expect("static regex")
});

pub(crate) static HTML_COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--(.*?)-->").expect("static regex"));

pub(crate) static BRACKETED_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\[({ID})\]")).expect("static regex"));

static VALID_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^{ID}$")).expect("static regex"));

/// Check that a migration id can be embedded in branches and tokens
#[inline]
#[must_use]
pub fn is_valid_migration_id(id: &str) -> bool {
    VALID_ID_RE.is_match(id)
}

fn require_valid(id: &str) -> Result<(), SignalError> {
    if is_valid_migration_id(id) {
        Ok(())
    } else {
        Err(SignalError::InvalidMigrationId(id.to_string()))
    }
}

/// Branch name for a migration step
///
/// `StepRef::Unspecified` produces the bare `hachiko/{id}` form.
pub fn branch_name(migration_id: &str, step: StepRef) -> Result<String, SignalError> {
    require_valid(migration_id)?;
    Ok(match step {
        StepRef::Number(n) => format!("{BRANCH_PREFIX}{migration_id}-step-{n}"),
        StepRef::Cleanup => format!("{BRANCH_PREFIX}{migration_id}-cleanup"),
        StepRef::Unspecified => format!("{BRANCH_PREFIX}{migration_id}"),
    })
}

/// Tracking token for a migration step
pub fn tracking_token(migration_id: &str, step: StepRef) -> Result<String, SignalError> {
    require_valid(migration_id)?;
    match step {
        StepRef::Number(n) => Ok(format!("{TRACKING_PREFIX}{migration_id}:{n}")),
        StepRef::Cleanup => Ok(format!("{TRACKING_PREFIX}{migration_id}:cleanup")),
        StepRef::Unspecified => Err(SignalError::InvalidStep(step.to_string())),
    }
}

/// Tracking token wrapped in an HTML comment, ready to embed in a PR body
pub fn tracking_comment(migration_id: &str, step: StepRef) -> Result<String, SignalError> {
    tracking_token(migration_id, step).map(|token| format!("<!-- {token} -->"))
}

/// Migration id and step encoded in a branch name, if it follows either branch convention
pub(crate) fn parse_branch(branch: &str) -> Option<(String, StepRef)> {
    if let Some(caps) = BRANCH_RE.captures(branch) {
        let full = &caps[1];
        if let Some(sfx) = BRANCH_SUFFIX_RE.captures(full) {
            let step = if sfx.name("cleanup").is_some() {
                StepRef::Cleanup
            } else {
                sfx.name("step")
                    .map_or(StepRef::Unspecified, |m| StepRef::from_fragment(m.as_str()))
            };
            return Some((sfx["id"].to_string(), step));
        }
        return Some((full.to_string(), StepRef::Unspecified));
    }

    let caps = LEGACY_BRANCH_RE.captures(branch)?;
    let step = caps.name("rest").map_or(StepRef::Unspecified, |rest| {
        let rest = rest.as_str();
        rest.strip_prefix("step-")
            .map_or_else(|| StepRef::from_fragment(rest), StepRef::from_fragment)
    });
    Some((caps[1].to_string(), step))
}

/// Tracking tokens inside the HTML comments of `body`, in order
pub(crate) fn tokens_in_comments(body: &str) -> impl Iterator<Item = (String, StepRef)> + '_ {
    HTML_COMMENT_RE.captures_iter(body).filter_map(|comment| {
        let inner = comment.get(1)?.as_str();
        TRACKING_TOKEN_RE
            .captures(inner)
            .map(|t| (t["id"].to_string(), StepRef::from_fragment(&t["step"])))
    })
}

/// First tracking token found inside an HTML comment of `body`
pub(crate) fn token_in_comment(body: &str) -> Option<(String, StepRef)> {
    tokens_in_comments(body).next()
}

/// Tracking token leading the title
pub(crate) fn leading_token(title: &str) -> Option<(String, StepRef)> {
    LEADING_TRACKING_TOKEN_RE
        .captures(title)
        .map(|t| (t["id"].to_string(), StepRef::from_fragment(&t["step"])))
}

/// First bracketed id in the title
pub(crate) fn bracketed_id(title: &str) -> Option<String> {
    BRACKETED_ID_RE.captures(title).map(|c| c[1].to_string())
}
