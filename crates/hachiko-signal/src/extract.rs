//! Migration identity extraction
//!
//! Sources are tried in strict priority order and the first match wins:
//! 1. branch name (`hachiko/{id}`, `hachiko/{id}-{suffix}`, legacy `hachi/{id}/...`)
//! 2. tracking token inside an HTML comment in the body
//! 3. tracking token leading the title
//! 4. bracketed `[{id}]` anywhere in the title

use serde::{Deserialize, Serialize};

use crate::conventions::{
    bracketed_id, leading_token, parse_branch, token_in_comment, tokens_in_comments,
};
use crate::types::{HachikoPr, PrSignal, StepRef};

/// Where a migration id was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    /// Head branch name
    Branch,
    /// Tracking token inside an HTML comment in the body
    BodyToken,
    /// Tracking token leading the title
    TitleToken,
    /// Bracketed id in the title
    TitleBracket,
}

/// Result of a successful extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Migration id
    pub migration_id: String,
    /// Step carried by the winning source (bracketed ids carry none)
    pub step: StepRef,
    /// Winning source
    pub source: ExtractionSource,
}

/// Run the priority chain and report which source matched
#[must_use]
pub fn extract(pr: &PrSignal) -> Option<Extraction> {
    if let Some((migration_id, step)) = parse_branch(&pr.head_branch) {
        return Some(Extraction {
            migration_id,
            step,
            source: ExtractionSource::Branch,
        });
    }
    if let Some((migration_id, step)) = token_in_comment(&pr.body) {
        return Some(Extraction {
            migration_id,
            step,
            source: ExtractionSource::BodyToken,
        });
    }
    if let Some((migration_id, step)) = leading_token(&pr.title) {
        return Some(Extraction {
            migration_id,
            step,
            source: ExtractionSource::TitleToken,
        });
    }
    bracketed_id(&pr.title).map(|migration_id| Extraction {
        migration_id,
        step: StepRef::Unspecified,
        source: ExtractionSource::TitleBracket,
    })
}

/// Migration id for a pull request, if it belongs to one
#[inline]
#[must_use]
pub fn extract_migration_id(pr: &PrSignal) -> Option<String> {
    extract(pr).map(|e| e.migration_id)
}

/// Step carried by a pull request
///
/// The branch suffix is authoritative; a tracking token (body comment first,
/// then leading title) fills in when the branch carries no step. Only tokens
/// naming the extracted migration count.
#[must_use]
pub fn extract_step(pr: &PrSignal) -> StepRef {
    let Some(extraction) = extract(pr) else {
        return StepRef::Unspecified;
    };
    if extraction.step != StepRef::Unspecified {
        return extraction.step;
    }
    tokens_in_comments(&pr.body)
        .chain(leading_token(&pr.title))
        .find(|(id, step)| *id == extraction.migration_id && *step != StepRef::Unspecified)
        .map_or(StepRef::Unspecified, |(_, step)| step)
}

/// Normalize a pull request into a [`HachikoPr`] when it belongs to a migration
#[must_use]
pub fn detect_hachiko_pr(pr: &PrSignal) -> Option<HachikoPr> {
    let extraction = extract(pr)?;
    tracing::debug!(
        "Attributed PR #{} to {} via {:?}",
        pr.number,
        extraction.migration_id,
        extraction.source
    );
    Some(HachikoPr {
        number: pr.number,
        title: pr.title.clone(),
        url: pr.url.clone(),
        branch: pr.head_branch.clone(),
        labels: pr.labels.clone(),
        migration_id: extraction.migration_id,
        step: extract_step(pr),
        state: pr.state(),
    })
}

/// Check whether a pull request belongs to the given migration
#[inline]
#[must_use]
pub fn is_migration_pr(pr: &PrSignal, migration_id: &str) -> bool {
    extract_migration_id(pr).as_deref() == Some(migration_id)
}
